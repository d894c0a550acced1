use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::events::{EventHub, TransferEvent, TransferObserver};
use crate::job::{Job, JobKey};
use crate::probe::{ProbeReport, run_probe};
use crate::queue::JobQueue;
use crate::transfer::endpoint::{EndpointOptions, RemoteEndpoint, UploadOutcome};
use crate::transfer::enumeration::enumerate_local_files;
use crate::transfer::helpers::normalize_remote_arg;
use crate::transfer::remote_fs::Connector;
use crate::transfer::sftp::SftpConnector;
use crate::workers::{WorkerPool, WorkerTimings};

const IDLE_WAIT_STEP: Duration = Duration::from_millis(10);

/// Queued transfer client: synchronous pass-through operations plus a
/// background worker pool for enqueued jobs that retry until they succeed.
pub struct TransferClient<C: Connector = SftpConnector> {
    endpoint: Arc<RemoteEndpoint<C>>,
    queue: Arc<JobQueue>,
    events: Arc<EventHub>,
    workers: Mutex<Option<WorkerPool>>,
    disposed: AtomicBool,
}

impl TransferClient<SftpConnector> {
    /// Connect over SFTP using the credentials in `config`. Connections are
    /// opened lazily by the pool, so an unreachable host surfaces on first use.
    pub fn connect(config: TransferConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let creds = config.credentials()?;
        tracing::info!("hostferry client for {}@{}{}", creds.username(), creds.addr(), creds.root_path());
        let connector = SftpConnector::new(creds, &config);
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> TransferClient<C> {
    pub fn with_connector(config: TransferConfig, connector: C) -> Result<Self, TransferError> {
        config.validate()?;
        let options = EndpointOptions::from_config(&config)?;
        let endpoint = Arc::new(RemoteEndpoint::new(connector, options));
        let queue = Arc::new(JobQueue::new());
        let events = Arc::new(EventHub::new());
        let timings =
            WorkerTimings { idle_poll: config.idle_poll(), failure_backoff: config.failure_backoff() };
        let pool =
            WorkerPool::spawn(config.workers, queue.clone(), endpoint.clone(), events.clone(), timings)?;
        Ok(Self {
            endpoint,
            queue,
            events,
            workers: Mutex::new(Some(pool)),
            disposed: AtomicBool::new(false),
        })
    }

    fn guard(&self) -> Result<(), TransferError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(TransferError::Disposed);
        }
        Ok(())
    }

    pub fn endpoint(&self) -> &RemoteEndpoint<C> {
        &self.endpoint
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn subscribe(&self) -> Receiver<TransferEvent> {
        self.events.subscribe()
    }

    pub fn on_event(&self, observer: Arc<dyn TransferObserver>) {
        self.events.register(observer);
    }

    // ---- synchronous ----

    pub fn upload_sync(&self, local: impl AsRef<Path>, remote: &str) -> Result<UploadOutcome, TransferError> {
        self.guard()?;
        self.endpoint.upload_local(local.as_ref(), remote)
    }

    /// Download `remote` into `local` and also return its bytes.
    pub fn download_sync(&self, remote: &str, local: impl AsRef<Path>) -> Result<Vec<u8>, TransferError> {
        self.guard()?;
        self.endpoint.download_to_local(remote, local.as_ref())
    }

    pub fn download_as_string_sync(
        &self,
        remote: &str,
        local: impl AsRef<Path>,
    ) -> Result<String, TransferError> {
        let bytes = self.download_sync(remote, local)?;
        let path = self.endpoint.resolve(remote)?;
        String::from_utf8(bytes).map_err(|_| TransferError::InvalidText(path))
    }

    pub fn delete_directory_sync(&self, remote: &str, require_exists: bool) -> Result<(), TransferError> {
        self.guard()?;
        self.endpoint.delete_directory_recursive(remote, require_exists)
    }

    pub fn delete_file_sync(&self, remote: &str, require_exists: bool) -> Result<(), TransferError> {
        self.guard()?;
        self.endpoint.delete_file(remote, require_exists)
    }

    pub fn exists_sync(&self, remote: &str) -> Result<bool, TransferError> {
        self.guard()?;
        self.endpoint.exists(remote)
    }

    pub fn list_sync(&self, remote: &str, require_exists: bool) -> Result<Option<Vec<String>>, TransferError> {
        self.guard()?;
        self.endpoint.list_entries(remote, require_exists)
    }

    pub fn rename_sync(&self, remote: &str, new_name: &str) -> Result<(), TransferError> {
        self.guard()?;
        self.endpoint.rename(remote, new_name)
    }

    // ---- queued ----

    /// Queue an upload. `Ok(false)` for an empty argument or a duplicate of a
    /// pending or running upload to the same remote path. A remote path that
    /// leaves the root is a `TransferError::Validation`.
    pub fn upload_async(&self, local: impl AsRef<Path>, remote: &str) -> Result<bool, TransferError> {
        self.guard()?;
        let (Some(local), Some(remote)) = (local_arg(local.as_ref()), self.remote_arg(remote)?) else {
            tracing::debug!("upload_async: empty argument rejected");
            return Ok(false);
        };
        Ok(self.queue.enqueue(Job::upload(local, remote)))
    }

    pub fn download_async(&self, remote: &str, local: impl AsRef<Path>) -> Result<bool, TransferError> {
        self.guard()?;
        let (Some(remote), Some(local)) = (self.remote_arg(remote)?, local_arg(local.as_ref())) else {
            tracing::debug!("download_async: empty argument rejected");
            return Ok(false);
        };
        Ok(self.queue.enqueue(Job::download(remote, local)))
    }

    /// Enqueue each `(local, remote)` pair; returns how many were accepted.
    pub fn upload_bulk_async<L, R>(&self, pairs: impl IntoIterator<Item = (L, R)>) -> Result<usize, TransferError>
    where
        L: AsRef<Path>,
        R: AsRef<str>,
    {
        let mut accepted = 0;
        for (local, remote) in pairs {
            if self.upload_async(local, remote.as_ref())? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Enqueue each `(remote, local)` pair; returns how many were accepted.
    pub fn download_bulk_async<R, L>(&self, pairs: impl IntoIterator<Item = (R, L)>) -> Result<usize, TransferError>
    where
        R: AsRef<str>,
        L: AsRef<Path>,
    {
        let mut accepted = 0;
        for (remote, local) in pairs {
            if self.download_async(remote.as_ref(), local)? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Queue one upload per regular file under `local_dir`, mirrored below
    /// `remote_dir`.
    pub fn upload_dir_async(&self, local_dir: impl AsRef<Path>, remote_dir: &str) -> Result<usize, TransferError> {
        self.guard()?;
        let base = self.remote_arg(remote_dir)?.unwrap_or_default();
        let files = enumerate_local_files(local_dir.as_ref())?;
        let mut accepted = 0;
        for f in files {
            let remote = if base.is_empty() { f.relative.clone() } else { format!("{}/{}", base, f.relative) };
            let Some(remote) = self.remote_arg(&remote)? else {
                continue;
            };
            if self.queue.enqueue(Job::upload(f.path, remote)) {
                accepted += 1;
            }
        }
        tracing::debug!("upload_dir_async: {} files queued from {}", accepted, local_dir.as_ref().display());
        Ok(accepted)
    }

    pub fn delete_directory_async(&self, remote: &str) -> Result<bool, TransferError> {
        self.guard()?;
        let Some(remote) = self.remote_arg(remote)? else {
            return Ok(false);
        };
        Ok(self.queue.enqueue(Job::delete_dir(remote)))
    }

    /// Remove a pending upload by remote path. Running jobs are not affected.
    /// Always `false` once disposed.
    pub fn cancel_async_upload(&self, remote: &str) -> bool {
        match self.cancel_key(remote) {
            Some(path) => self.queue.cancel(&JobKey::upload(&path)),
            None => false,
        }
    }

    /// Remove a pending download by local path. Running jobs are not affected.
    pub fn cancel_async_download(&self, local: impl AsRef<Path>) -> bool {
        if self.guard().is_err() {
            return false;
        }
        self.queue.cancel(&JobKey::download(&local.as_ref().to_string_lossy()))
    }

    pub fn cancel_async_delete_directory(&self, remote: &str) -> bool {
        match self.cancel_key(remote) {
            Some(path) => self.queue.cancel(&JobKey::delete_dir(&path)),
            None => false,
        }
    }

    /// `false` once disposed.
    pub fn is_busy(&self) -> bool {
        self.jobs_remaining() > 0
    }

    /// Pending plus running jobs; 0 once disposed.
    pub fn jobs_remaining(&self) -> usize {
        if self.guard().is_err() {
            return 0;
        }
        self.queue.size()
    }

    /// Block until no job is pending or running. `false` on timeout, and
    /// immediately `false` once disposed.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        if self.guard().is_err() {
            return false;
        }
        let deadline = Instant::now() + timeout;
        loop {
            if self.queue.size() == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_WAIT_STEP);
        }
    }

    /// Run the connectivity probe. Every status message goes to `status` and
    /// is also emitted as a `ConnectivityProgress` event.
    pub fn test_connectivity(
        &self,
        user_state: Option<String>,
        mut status: impl FnMut(&str),
    ) -> Result<ProbeReport, TransferError> {
        self.guard()?;
        let report = run_probe(&*self.endpoint, |msg| {
            status(msg);
            self.events.emit(TransferEvent::ConnectivityProgress {
                message: msg.to_string(),
                user_state: user_state.clone(),
            });
        });
        Ok(report)
    }

    /// Stop the worker pool. Idempotent; further guarded calls fail with
    /// `TransferError::Disposed`. Jobs still queued are abandoned.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pool = self.workers.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut pool) = pool {
            pool.shutdown();
        }
        tracing::info!("transfer client disposed ({} jobs left)", self.queue.size());
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Canonical job path for a remote argument: normalized, resolved against
    /// the root and made root-relative again, so every spelling of one remote
    /// file yields the same key. `None` when nothing is left (the root itself).
    fn remote_arg(&self, remote: &str) -> Result<Option<String>, TransferError> {
        if normalize_remote_arg(remote).is_empty() {
            return Ok(None);
        }
        let resolved = self.endpoint.resolve(remote)?;
        let rel = resolved.strip_prefix(self.endpoint.root()).unwrap_or(resolved.as_str()).trim_matches('/');
        if rel.is_empty() { Ok(None) } else { Ok(Some(rel.to_string())) }
    }

    fn cancel_key(&self, remote: &str) -> Option<String> {
        self.guard().ok()?;
        self.remote_arg(remote).ok().flatten()
    }
}

impl<C: Connector> Drop for TransferClient<C> {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn local_arg(local: &Path) -> Option<PathBuf> {
    let s = local.to_string_lossy();
    let t = s.trim();
    if t.is_empty() { None } else { Some(PathBuf::from(t)) }
}
