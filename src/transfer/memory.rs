//! In-memory remote store with fault injection, used by the test-suite and by
//! hosts that want to exercise the queue without a server.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::RemoteFault;
use crate::transfer::helpers::{normalize_path, remote_parent};
use crate::transfer::remote_fs::{Connector, RemoteFs, RemoteStat};

/// Primitive operations, for call counting and fault targeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Stat,
    ReadDir,
    Mkdir,
    Rmdir,
    Unlink,
    Rename,
    Read,
    Write,
}

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
}

/// One injected failure rule. `remaining == None` means fail forever.
#[derive(Debug, Clone)]
pub struct FaultPlan {
    pub op: Op,
    pub path_contains: Option<String>,
    pub remaining: Option<usize>,
    pub fault: RemoteFault,
}

impl FaultPlan {
    pub fn new(op: Op, fault: RemoteFault) -> Self {
        Self { op, path_contains: None, remaining: None, fault }
    }

    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    pub fn on_paths_containing(mut self, needle: &str) -> Self {
        self.path_contains = Some(needle.to_string());
        self
    }
}

#[derive(Default)]
struct Store {
    nodes: BTreeMap<String, Node>,
    faults: Vec<FaultPlan>,
}

impl Store {
    fn take_fault(&mut self, op: Op, path: &str) -> Option<RemoteFault> {
        let idx = self.faults.iter().position(|f| {
            f.op == op
                && f.remaining != Some(0)
                && f.path_contains.as_deref().is_none_or(|needle| path.contains(needle))
        })?;
        let plan = &mut self.faults[idx];
        if let Some(n) = plan.remaining.as_mut() {
            *n -= 1;
        }
        Some(plan.fault.clone())
    }

    fn children(&self, dir: &str) -> Vec<String> {
        let prefix = if dir == "/" { "/".to_string() } else { format!("{}/", dir) };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    fn require_parent_dir(&self, path: &str) -> Result<(), RemoteFault> {
        let parent = remote_parent(path).unwrap_or("/");
        match self.nodes.get(parent) {
            Some(Node::Dir) => Ok(()),
            Some(Node::File(_)) => Err(RemoteFault::NotADirectory),
            None => Err(RemoteFault::NotFound),
        }
    }
}

struct Shared {
    store: Mutex<Store>,
    calls: Mutex<HashMap<Op, usize>>,
    latency: Mutex<Duration>,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    connects: AtomicUsize,
    failing_connects: AtomicUsize,
}

/// Cloneable handle: clones share one namespace and one set of counters.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    /// Store whose root directory (and every ancestor) already exists.
    pub fn new(root: &str) -> Self {
        let mut store = Store::default();
        store.nodes.insert("/".to_string(), Node::Dir);
        let root = normalize_path(root, false);
        let mut accum = String::new();
        for seg in root.split('/').filter(|s| !s.is_empty()) {
            accum.push('/');
            accum.push_str(seg);
            store.nodes.insert(accum.clone(), Node::Dir);
        }
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(store),
                calls: Mutex::new(HashMap::new()),
                latency: Mutex::new(Duration::ZERO),
                live: AtomicUsize::new(0),
                peak_live: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                failing_connects: AtomicUsize::new(0),
            }),
        }
    }

    fn store(&self) -> std::sync::MutexGuard<'_, Store> {
        self.shared.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn inject(&self, plan: FaultPlan) {
        self.store().faults.push(plan);
    }

    /// Fail the next `n` calls of `op` with a generic remote error.
    pub fn fail_next(&self, op: Op, n: usize) {
        self.inject(FaultPlan::new(op, RemoteFault::Protocol("injected failure".into())).times(n));
    }

    /// Fail every call of `op` until `clear_faults`.
    pub fn fail_always(&self, op: Op, fault: RemoteFault) {
        self.inject(FaultPlan::new(op, fault));
    }

    pub fn clear_faults(&self) {
        self.store().faults.clear();
    }

    /// Make the next `n` connection attempts fail.
    pub fn fail_connects(&self, n: usize) {
        self.shared.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Delay applied to every primitive, outside the store lock.
    pub fn set_latency(&self, latency: Duration) {
        *self.shared.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    /// Seed a file, creating missing parent directories.
    pub fn put_file(&self, path: &str, data: &[u8]) {
        let path = normalize_path(path, false);
        let mut store = self.store();
        let mut accum = String::new();
        let segs: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        for seg in &segs[..segs.len().saturating_sub(1)] {
            accum.push('/');
            accum.push_str(seg);
            store.nodes.entry(accum.clone()).or_insert(Node::Dir);
        }
        store.nodes.insert(path, Node::File(data.to_vec()));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        match self.store().nodes.get(&normalize_path(path, false)) {
            Some(Node::File(b)) => Some(b.clone()),
            _ => None,
        }
    }

    pub fn is_dir(&self, path: &str) -> bool {
        matches!(self.store().nodes.get(&normalize_path(path, false)), Some(Node::Dir))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.store().nodes.contains_key(&normalize_path(path, false))
    }

    /// Every path currently in the namespace, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.store().nodes.keys().cloned().collect()
    }

    pub fn calls(&self, op: Op) -> usize {
        self.shared.calls.lock().unwrap_or_else(PoisonError::into_inner).get(&op).copied().unwrap_or(0)
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    pub fn peak_live(&self) -> usize {
        self.shared.peak_live.load(Ordering::SeqCst)
    }

    fn begin(&self, op: Op, path: &str) -> Result<std::sync::MutexGuard<'_, Store>, RemoteFault> {
        *self.shared.calls.lock().unwrap_or_else(PoisonError::into_inner).entry(op).or_insert(0) += 1;
        let latency = *self.shared.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let mut store = self.store();
        match store.take_fault(op, path) {
            Some(fault) => Err(fault),
            None => Ok(store),
        }
    }
}

impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    fn connect(&self) -> Result<MemoryConnection, RemoteFault> {
        let failing = &self.shared.failing_connects;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RemoteFault::Connection("injected connect failure".into()));
        }
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        let now = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.peak_live.fetch_max(now, Ordering::SeqCst);
        Ok(MemoryConnection { connector: self.clone() })
    }

    fn describe(&self) -> String {
        "memory://".to_string()
    }
}

pub struct MemoryConnection {
    connector: MemoryConnector,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.connector.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RemoteFs for MemoryConnection {
    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteFault> {
        let store = self.connector.begin(Op::Stat, path)?;
        match store.nodes.get(path) {
            Some(Node::Dir) => Ok(RemoteStat { is_dir: true, size: None, mtime: None }),
            Some(Node::File(b)) => {
                Ok(RemoteStat { is_dir: false, size: Some(b.len() as u64), mtime: Some(0) })
            }
            None => Err(RemoteFault::NotFound),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>, RemoteFault> {
        let store = self.connector.begin(Op::ReadDir, path)?;
        match store.nodes.get(path) {
            Some(Node::Dir) => Ok(store.children(path)),
            Some(Node::File(_)) => Err(RemoteFault::NotADirectory),
            None => Err(RemoteFault::NotFound),
        }
    }

    fn mkdir(&self, path: &str) -> Result<(), RemoteFault> {
        let mut store = self.connector.begin(Op::Mkdir, path)?;
        if store.nodes.contains_key(path) {
            return Err(RemoteFault::AlreadyExists);
        }
        store.require_parent_dir(path)?;
        store.nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    fn rmdir(&self, path: &str) -> Result<(), RemoteFault> {
        let mut store = self.connector.begin(Op::Rmdir, path)?;
        match store.nodes.get(path) {
            None => Err(RemoteFault::NotFound),
            Some(Node::File(_)) => Err(RemoteFault::NotADirectory),
            Some(Node::Dir) if !store.children(path).is_empty() => {
                Err(RemoteFault::Protocol("directory not empty".into()))
            }
            Some(Node::Dir) => {
                store.nodes.remove(path);
                Ok(())
            }
        }
    }

    fn unlink(&self, path: &str) -> Result<(), RemoteFault> {
        let mut store = self.connector.begin(Op::Unlink, path)?;
        match store.nodes.get(path) {
            None => Err(RemoteFault::NotFound),
            Some(Node::Dir) => Err(RemoteFault::Protocol("is a directory".into())),
            Some(Node::File(_)) => {
                store.nodes.remove(path);
                Ok(())
            }
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), RemoteFault> {
        let mut store = self.connector.begin(Op::Rename, from)?;
        let node = store.nodes.get(from).cloned().ok_or(RemoteFault::NotFound)?;
        store.require_parent_dir(to)?;
        if matches!(store.nodes.get(to), Some(Node::Dir)) {
            return Err(RemoteFault::Protocol("target is a directory".into()));
        }
        if let Node::Dir = node {
            let prefix = format!("{}/", from);
            let moved: Vec<(String, Node)> = store
                .nodes
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .map(|(k, v)| (format!("{}/{}", to, &k[prefix.len()..]), v.clone()))
                .collect();
            store.nodes.retain(|k, _| !k.starts_with(&prefix));
            store.nodes.extend(moved);
        }
        store.nodes.remove(from);
        store.nodes.insert(to.to_string(), node);
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, RemoteFault> {
        let store = self.connector.begin(Op::Read, path)?;
        match store.nodes.get(path) {
            Some(Node::File(b)) => Ok(b.clone()),
            Some(Node::Dir) => Err(RemoteFault::Protocol("is a directory".into())),
            None => Err(RemoteFault::NotFound),
        }
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), RemoteFault> {
        let mut store = self.connector.begin(Op::Write, path)?;
        store.require_parent_dir(path)?;
        if matches!(store.nodes.get(path), Some(Node::Dir)) {
            return Err(RemoteFault::Protocol("is a directory".into()));
        }
        store.nodes.insert(path.to_string(), Node::File(data.to_vec()));
        Ok(())
    }
}
