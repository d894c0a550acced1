use std::path::Path;

use crate::config::TransferConfig;
use crate::error::{RemoteFault, TransferError};
use crate::transfer::helpers::{fold_dot_segments, normalize_path, remote_parent, with_trailing_slash};
use crate::transfer::local::{read_local, write_local_atomic};
use crate::transfer::pool::{ConnectionPool, PooledConn};
use crate::transfer::remote_fs::{Connector, RemoteFs, RemoteStat};

/// Suffix of the sibling an upload is written to before being renamed into place.
pub const UPLOAD_TEMP_SUFFIX: &str = ".hfpart";

/// Result of `create_or_replace_file`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Payload written and renamed over the final name.
    Published,
    /// A file already existed and skip-if-exists is enabled; nothing was sent.
    Skipped,
}

#[derive(Debug, Clone)]
pub struct EndpointOptions {
    /// Absolute remote root; normalized to end with `/`.
    pub root: String,
    pub max_connections: usize,
    pub keep_alive: bool,
    pub skip_if_exists: bool,
}

impl EndpointOptions {
    pub fn new(root: &str) -> Self {
        let defaults = TransferConfig::default();
        Self {
            root: root.to_string(),
            max_connections: defaults.max_connections,
            keep_alive: defaults.keep_alive,
            skip_if_exists: defaults.skip_if_exists,
        }
    }

    pub fn from_config(config: &TransferConfig) -> Result<Self, TransferError> {
        let creds = config.credentials()?;
        Ok(Self {
            root: creds.root_path().to_string(),
            max_connections: config.max_connections,
            keep_alive: config.keep_alive,
            skip_if_exists: config.skip_if_exists,
        })
    }
}

/// Synchronous gateway performing one remote operation per call against the
/// configured root. Knows nothing about queueing.
pub struct RemoteEndpoint<C: Connector> {
    pool: ConnectionPool<C>,
    root: String,
    skip_if_exists: bool,
}

impl<C: Connector> RemoteEndpoint<C> {
    pub fn new(connector: C, options: EndpointOptions) -> Self {
        let root = with_trailing_slash(&options.root);
        let root = if root.starts_with('/') { root } else { format!("/{}", root) };
        Self {
            pool: ConnectionPool::new(connector, options.max_connections, options.keep_alive),
            root,
            skip_if_exists: options.skip_if_exists,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Resolve a possibly root-relative path. Keeps a trailing `/` if given.
    /// `.` and `..` are folded; a path that ends up outside the root is a
    /// `TransferError::Validation`.
    pub fn resolve(&self, path: &str) -> Result<String, TransferError> {
        let p = normalize_path(path.trim(), true);
        let rooted = p.starts_with(&self.root) || with_trailing_slash(&p) == self.root;
        let joined = if rooted { p } else { format!("{}{}", self.root, p.trim_start_matches('/')) };
        let escapes = || {
            TransferError::Validation(format!("path '{}' escapes remote root {}", path.trim(), self.root))
        };
        let folded = fold_dot_segments(&joined).ok_or_else(escapes)?;
        if with_trailing_slash(&folded) == self.root {
            return Ok(self.root.clone());
        }
        if !folded.starts_with(&self.root) {
            return Err(escapes());
        }
        Ok(folded)
    }

    // 传给原语的路径不带尾部 '/'
    fn fs_path(&self, path: &str) -> Result<String, TransferError> {
        Ok(normalize_path(&self.resolve(path)?, false))
    }

    fn is_at_or_above_root(&self, dir: &str) -> bool {
        with_trailing_slash(dir).len() <= self.root.len()
    }

    fn with_conn<T>(
        &self,
        op: &'static str,
        path: &str,
        f: impl FnOnce(&mut PooledConn<'_, C>) -> Result<T, TransferError>,
    ) -> Result<T, TransferError> {
        let mut conn = self.pool.checkout().map_err(|e| TransferError::remote(op, path, e))?;
        f(&mut conn)
    }

    /// Upload `data` to `remote`, publishing atomically via a temp sibling.
    pub fn create_or_replace_file(
        &self,
        data: &[u8],
        remote: &str,
    ) -> Result<UploadOutcome, TransferError> {
        let target = self.fs_path(remote)?;
        if with_trailing_slash(&target) == self.root {
            return Err(TransferError::Validation(format!("cannot upload over remote root {}", self.root)));
        }
        let temp = format!("{}{}", target, UPLOAD_TEMP_SUFFIX);
        self.with_conn("upload", &target, |c| {
            if stat_opt(c, &target).map_err(|e| TransferError::remote("upload", &target, e))?.is_some() {
                if self.skip_if_exists {
                    tracing::debug!("upload skipped, {} already exists", target);
                    return Ok(UploadOutcome::Skipped);
                }
                swallow_not_found(c.run(|fs| fs.unlink(&target)))
                    .map_err(|e| TransferError::remote("delete existing", &target, e))?;
            }
            if let Some(parent) = remote_parent(&target) {
                self.ensure_dir(c, parent)?;
            }
            // 清理上次中断遗留的临时文件
            if stat_opt(c, &temp).map_err(|e| TransferError::remote("upload", &temp, e))?.is_some() {
                swallow_not_found(c.run(|fs| fs.unlink(&temp)))
                    .map_err(|e| TransferError::remote("delete stale temp", &temp, e))?;
            }
            c.run(|fs| fs.write(&temp, data))
                .map_err(|e| TransferError::remote("upload", &target, e))?;
            c.run(|fs| fs.rename(&temp, &target))
                .map_err(|e| TransferError::remote("publish", &target, e))?;
            tracing::debug!("published {} ({} bytes)", target, data.len());
            Ok(UploadOutcome::Published)
        })
    }

    /// mkdir -p: create `dir` and any missing ancestors below the root.
    fn ensure_dir(&self, c: &mut PooledConn<'_, C>, dir: &str) -> Result<(), TransferError> {
        if self.is_at_or_above_root(dir) {
            return Ok(());
        }
        match c.run(|fs| fs.stat(dir)) {
            Ok(st) if st.is_dir => return Ok(()),
            Ok(_) => return Err(TransferError::remote("mkdir", dir, RemoteFault::NotADirectory)),
            Err(RemoteFault::NotFound) => {}
            Err(e) => return Err(TransferError::remote("mkdir", dir, e)),
        }
        if let Some(parent) = remote_parent(dir) {
            self.ensure_dir(c, parent)?;
        }
        match c.run(|fs| fs.mkdir(dir)) {
            Ok(()) | Err(RemoteFault::AlreadyExists) => Ok(()),
            Err(e) => {
                // 可能被其他 worker 并发创建；复查一次
                match c.run(|fs| fs.stat(dir)) {
                    Ok(st) if st.is_dir => Ok(()),
                    _ => Err(TransferError::remote("mkdir", dir, e)),
                }
            }
        }
    }

    /// Download the whole file. Absent + `!require_exists` yields `Ok(None)`.
    pub fn read_file(
        &self,
        remote: &str,
        require_exists: bool,
    ) -> Result<Option<Vec<u8>>, TransferError> {
        let path = self.fs_path(remote)?;
        self.with_conn("download", &path, |c| match c.run(|fs| fs.read(&path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(RemoteFault::NotFound) if require_exists => Err(TransferError::NotFound(path.clone())),
            Err(RemoteFault::NotFound) => Ok(None),
            Err(e) => Err(TransferError::remote("download", &path, e)),
        })
    }

    pub fn read_file_as_text(
        &self,
        remote: &str,
        require_exists: bool,
    ) -> Result<Option<String>, TransferError> {
        let path = self.fs_path(remote)?;
        match self.read_file(remote, require_exists)? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| TransferError::InvalidText(path)),
            None => Ok(None),
        }
    }

    /// Metadata probe; `false` only for a not-found response.
    pub fn exists(&self, remote: &str) -> Result<bool, TransferError> {
        let path = self.fs_path(remote)?;
        self.with_conn("exists", &path, |c| {
            stat_opt(c, &path)
                .map(|st| st.is_some())
                .map_err(|e| TransferError::remote("exists", &path, e))
        })
    }

    pub fn delete_file(&self, remote: &str, require_exists: bool) -> Result<(), TransferError> {
        let path = self.fs_path(remote)?;
        self.with_conn("delete", &path, |c| self.delete_file_on(c, &path, require_exists))
    }

    fn delete_file_on(
        &self,
        c: &mut PooledConn<'_, C>,
        path: &str,
        require_exists: bool,
    ) -> Result<(), TransferError> {
        match c.run(|fs| fs.unlink(path)) {
            Ok(()) => Ok(()),
            Err(RemoteFault::NotFound) if require_exists => Err(TransferError::NotFound(path.to_string())),
            Err(RemoteFault::NotFound) => Ok(()),
            Err(e) => Err(TransferError::remote("delete", path, e)),
        }
    }

    /// Child names of a directory. `Ok(None)` when the path is a plain file, or
    /// absent and `!require_exists`.
    pub fn list_entries(
        &self,
        remote: &str,
        require_exists: bool,
    ) -> Result<Option<Vec<String>>, TransferError> {
        let path = self.fs_path(remote)?;
        self.with_conn("list", &path, |c| self.list_on(c, &path, require_exists))
    }

    fn list_on(
        &self,
        c: &mut PooledConn<'_, C>,
        path: &str,
        require_exists: bool,
    ) -> Result<Option<Vec<String>>, TransferError> {
        match c.run(|fs| fs.stat(path)) {
            Ok(st) if !st.is_dir => return Ok(None),
            Ok(_) => {}
            Err(RemoteFault::NotFound) if require_exists => {
                return Err(TransferError::NotFound(path.to_string()));
            }
            Err(RemoteFault::NotFound) => return Ok(None),
            Err(e) => return Err(TransferError::remote("list", path, e)),
        }
        match c.run(|fs| fs.read_dir(path)) {
            Ok(names) => Ok(Some(names)),
            Err(RemoteFault::NotADirectory) => Ok(None),
            Err(RemoteFault::NotFound) if !require_exists => Ok(None),
            Err(e) => Err(TransferError::remote("list", path, e)),
        }
    }

    /// Remove a directory and everything below it. The configured root itself
    /// is never removed, only emptied. A path naming a file deletes the file.
    pub fn delete_directory_recursive(
        &self,
        remote: &str,
        require_exists: bool,
    ) -> Result<(), TransferError> {
        let dir = with_trailing_slash(&self.resolve(remote)?);
        self.with_conn("delete directory", &dir, |c| self.delete_tree(c, &dir, require_exists))
    }

    fn delete_tree(
        &self,
        c: &mut PooledConn<'_, C>,
        dir: &str,
        require_exists: bool,
    ) -> Result<(), TransferError> {
        let at_root = dir == self.root;
        let path = normalize_path(dir, false);
        match self.list_on(c, &path, require_exists)? {
            None => {
                if at_root {
                    return Ok(());
                }
                return self.delete_file_on(c, &path, require_exists);
            }
            Some(children) => {
                // 子项名不能带路径分隔符或 . / ..
                for child in children.iter().filter(|n| is_plain_name(n)) {
                    self.delete_tree(c, &format!("{}{}/", dir, child), require_exists)?;
                }
            }
        }
        if at_root {
            tracing::debug!("delete_directory_recursive: keeping root {}", self.root);
            return Ok(());
        }
        match c.run(|fs| fs.rmdir(&path)) {
            Ok(()) => Ok(()),
            Err(RemoteFault::NotFound) if require_exists => Err(TransferError::NotFound(path)),
            Err(RemoteFault::NotFound) => Ok(()),
            Err(e) => Err(TransferError::remote("remove directory", &path, e)),
        }
    }

    /// Rename within the same parent directory.
    pub fn rename(&self, remote: &str, new_name: &str) -> Result<(), TransferError> {
        let new_name = new_name.trim();
        if new_name.is_empty() || new_name.contains('/') || new_name.contains('\\') {
            return Err(TransferError::Validation(format!("invalid new name '{}'", new_name)));
        }
        let from = self.fs_path(remote)?;
        if new_name == "." || new_name == ".." || with_trailing_slash(&from) == self.root {
            return Err(TransferError::Validation(format!("cannot rename {} to '{}'", from, new_name)));
        }
        let to = match remote_parent(&from) {
            Some("/") | None => format!("/{}", new_name),
            Some(parent) => format!("{}/{}", parent, new_name),
        };
        self.with_conn("rename", &from, |c| {
            c.run(|fs| fs.rename(&from, &to)).map_err(|e| match e {
                RemoteFault::NotFound => TransferError::NotFound(from.clone()),
                other => TransferError::remote("rename", &from, other),
            })
        })
    }

    /// Read a local file and publish it at `remote`.
    pub fn upload_local(&self, local: &Path, remote: &str) -> Result<UploadOutcome, TransferError> {
        let data = read_local(local)?;
        self.create_or_replace_file(&data, remote)
    }

    /// Download `remote` (which must exist), write it atomically to `local`
    /// and return the bytes.
    pub fn download_to_local(&self, remote: &str, local: &Path) -> Result<Vec<u8>, TransferError> {
        let path = self.fs_path(remote)?;
        let bytes = self.read_file(remote, true)?.ok_or(TransferError::NotFound(path))?;
        write_local_atomic(local, &bytes)?;
        Ok(bytes)
    }
}

fn stat_opt<C: Connector>(
    c: &mut PooledConn<'_, C>,
    path: &str,
) -> Result<Option<RemoteStat>, RemoteFault> {
    match c.run(|fs| fs.stat(path)) {
        Ok(st) => Ok(Some(st)),
        Err(RemoteFault::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

fn swallow_not_found(res: Result<(), RemoteFault>) -> Result<(), RemoteFault> {
    match res {
        Err(RemoteFault::NotFound) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::memory::{FaultPlan, MemoryConnector, Op};

    fn endpoint(skip: bool) -> (RemoteEndpoint<MemoryConnector>, MemoryConnector) {
        let store = MemoryConnector::new("/srv/data/");
        let mut opts = EndpointOptions::new("/srv/data");
        opts.skip_if_exists = skip;
        (RemoteEndpoint::new(store.clone(), opts), store)
    }

    #[test]
    fn resolve_relative_and_rooted_paths() {
        let (ep, _) = endpoint(true);
        assert_eq!(ep.root(), "/srv/data/");
        assert_eq!(ep.resolve("a/b.txt").unwrap(), "/srv/data/a/b.txt");
        assert_eq!(ep.resolve("/a/b.txt").unwrap(), "/srv/data/a/b.txt");
        assert_eq!(ep.resolve("/srv/data/a/b.txt").unwrap(), "/srv/data/a/b.txt");
        assert_eq!(ep.resolve("/srv/data").unwrap(), "/srv/data/");
        assert_eq!(ep.resolve("sub\\dir/").unwrap(), "/srv/data/sub/dir/");
        assert_eq!(ep.resolve("a/./b/../c.txt").unwrap(), "/srv/data/a/c.txt");
        assert_eq!(ep.resolve("a/..").unwrap(), "/srv/data/");
    }

    #[test]
    fn parent_segments_cannot_leave_root() {
        let (ep, _) = endpoint(true);
        for p in ["..", "../", "a/../..", "/srv/data/../other", "../../x", "/srv/data/.."] {
            assert!(matches!(ep.resolve(p), Err(TransferError::Validation(_))), "{}", p);
        }
    }

    #[test]
    fn recursive_delete_above_root_is_refused() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/keep.txt", b"1");
        store.put_file("/srv/other/secret.txt", b"2");
        assert!(matches!(ep.delete_directory_recursive("..", false), Err(TransferError::Validation(_))));
        assert!(matches!(
            ep.delete_directory_recursive("sub/../../other", false),
            Err(TransferError::Validation(_))
        ));
        assert!(store.contains("/srv/data/keep.txt"));
        assert!(store.contains("/srv/other/secret.txt"));
        assert_eq!(store.calls(Op::Stat), 0);
    }

    #[test]
    fn writes_outside_root_are_refused() {
        let (ep, store) = endpoint(false);
        assert!(matches!(ep.create_or_replace_file(b"x", "../../x"), Err(TransferError::Validation(_))));
        assert!(matches!(ep.create_or_replace_file(b"x", "/"), Err(TransferError::Validation(_))));
        assert!(matches!(ep.delete_file("../secret.txt", false), Err(TransferError::Validation(_))));
        assert!(matches!(ep.rename("a.txt", ".."), Err(TransferError::Validation(_))));
        assert_eq!(store.calls(Op::Write), 0);
        assert!(!store.contains("/x"));
    }

    #[test]
    fn round_trip_binary_and_empty() {
        let (ep, _) = endpoint(false);
        let tricky: Vec<u8> = b"\r\n.\r\nQUIT\r\n\x00\xff\xfe".to_vec();
        for (name, data) in [("x/tricky.bin", tricky), ("empty.bin", Vec::new())] {
            assert_eq!(ep.create_or_replace_file(&data, name).unwrap(), UploadOutcome::Published);
            assert_eq!(ep.read_file(name, true).unwrap(), Some(data));
        }
    }

    #[test]
    fn upload_creates_parent_chain() {
        let (ep, store) = endpoint(true);
        ep.create_or_replace_file(b"hi", "a/b/c/file.txt").unwrap();
        assert!(store.is_dir("/srv/data/a"));
        assert!(store.is_dir("/srv/data/a/b/c"));
        assert_eq!(store.file("/srv/data/a/b/c/file.txt").unwrap(), b"hi");
        assert!(!store.contains("/srv/data/a/b/c/file.txt.hfpart"));
    }

    #[test]
    fn skip_if_exists_keeps_original() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/keep.txt", b"X");
        assert_eq!(ep.create_or_replace_file(b"Y", "keep.txt").unwrap(), UploadOutcome::Skipped);
        assert_eq!(store.file("/srv/data/keep.txt").unwrap(), b"X");
        assert_eq!(store.calls(Op::Write), 0);
    }

    #[test]
    fn replace_when_skip_disabled() {
        let (ep, store) = endpoint(false);
        store.put_file("/srv/data/keep.txt", b"X");
        ep.create_or_replace_file(b"Y", "keep.txt").unwrap();
        assert_eq!(store.file("/srv/data/keep.txt").unwrap(), b"Y");
    }

    #[test]
    fn failed_rename_leaves_no_final_file_and_retry_cleans_temp() {
        let (ep, store) = endpoint(false);
        store.fail_next(Op::Rename, 1);
        assert!(ep.create_or_replace_file(b"payload", "pub/out.txt").is_err());
        assert!(!store.contains("/srv/data/pub/out.txt"));
        assert!(store.contains("/srv/data/pub/out.txt.hfpart"));

        ep.create_or_replace_file(b"payload", "pub/out.txt").unwrap();
        assert_eq!(store.file("/srv/data/pub/out.txt").unwrap(), b"payload");
        assert!(!store.contains("/srv/data/pub/out.txt.hfpart"));
    }

    #[test]
    fn mkdir_already_exists_is_not_fatal() {
        let (ep, store) = endpoint(true);
        // stat 报不存在，但 mkdir 发现已存在（并发创建）
        store.inject(FaultPlan::new(Op::Stat, RemoteFault::NotFound).times(2).on_paths_containing("/race"));
        store.put_file("/srv/data/race/placeholder", b"");
        ep.create_or_replace_file(b"1", "race/f.txt").unwrap();
        assert_eq!(store.file("/srv/data/race/f.txt").unwrap(), b"1");
    }

    #[test]
    fn read_missing_file() {
        let (ep, _) = endpoint(true);
        assert_eq!(ep.read_file("nope.txt", false).unwrap(), None);
        assert!(matches!(ep.read_file("nope.txt", true), Err(TransferError::NotFound(_))));
        assert_eq!(ep.read_file_as_text("nope.txt", false).unwrap(), None);
    }

    #[test]
    fn read_text_rejects_invalid_utf8() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/bad.txt", &[0xff, 0xfe, 0x00]);
        assert!(matches!(ep.read_file_as_text("bad.txt", true), Err(TransferError::InvalidText(_))));
        store.put_file("/srv/data/good.txt", "héllo".as_bytes());
        assert_eq!(ep.read_file_as_text("good.txt", true).unwrap().as_deref(), Some("héllo"));
    }

    #[test]
    fn exists_propagates_non_not_found_errors() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/a.txt", b"1");
        assert!(ep.exists("a.txt").unwrap());
        assert!(!ep.exists("b.txt").unwrap());
        store.fail_next(Op::Stat, 1);
        assert!(matches!(ep.exists("a.txt"), Err(TransferError::Remote { .. })));
    }

    #[test]
    fn delete_file_require_exists() {
        let (ep, store) = endpoint(true);
        assert!(ep.delete_file("ghost.txt", false).is_ok());
        assert!(matches!(ep.delete_file("ghost.txt", true), Err(TransferError::NotFound(_))));
        store.put_file("/srv/data/real.txt", b"1");
        ep.delete_file("real.txt", true).unwrap();
        assert!(!store.contains("/srv/data/real.txt"));
    }

    #[test]
    fn list_distinguishes_file_empty_dir_and_missing() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/f.txt", b"1");
        store.put_file("/srv/data/d/x.txt", b"1");
        ep.delete_file("d/x.txt", true).unwrap();
        assert_eq!(ep.list_entries("f.txt", true).unwrap(), None);
        assert_eq!(ep.list_entries("d", true).unwrap(), Some(vec![]));
        assert_eq!(ep.list_entries("missing", false).unwrap(), None);
        assert!(matches!(ep.list_entries("missing", true), Err(TransferError::NotFound(_))));
    }

    #[test]
    fn recursive_delete_removes_tree() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/tree/a.txt", b"1");
        store.put_file("/srv/data/tree/sub/b.txt", b"2");
        store.put_file("/srv/data/tree/sub/deeper/c.txt", b"3");
        store.put_file("/srv/data/other.txt", b"4");
        ep.delete_directory_recursive("tree", true).unwrap();
        assert!(!store.paths().iter().any(|p| p.starts_with("/srv/data/tree")));
        assert_eq!(ep.list_entries("tree", false).unwrap(), None);
        assert!(store.contains("/srv/data/other.txt"));
    }

    #[test]
    fn recursive_delete_on_root_keeps_root() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/a/b.txt", b"1");
        store.put_file("/srv/data/c.txt", b"1");
        ep.delete_directory_recursive("/", false).unwrap();
        assert!(store.is_dir("/srv/data"));
        assert_eq!(ep.list_entries("", true).unwrap(), Some(vec![]));
    }

    #[test]
    fn recursive_delete_of_file_and_missing() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/lonely.txt", b"1");
        ep.delete_directory_recursive("lonely.txt", true).unwrap();
        assert!(!store.contains("/srv/data/lonely.txt"));
        assert!(ep.delete_directory_recursive("nothing", false).is_ok());
        assert!(ep.delete_directory_recursive("nothing", true).is_err());
    }

    #[test]
    fn rename_within_parent() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/dir/old.txt", b"z");
        ep.rename("dir/old.txt", "new.txt").unwrap();
        assert_eq!(store.file("/srv/data/dir/new.txt").unwrap(), b"z");
        assert!(!store.contains("/srv/data/dir/old.txt"));
        assert!(matches!(ep.rename("dir/new.txt", "a/b"), Err(TransferError::Validation(_))));
        assert!(matches!(ep.rename("dir/none.txt", "x"), Err(TransferError::NotFound(_))));
    }

    #[test]
    fn connection_faults_drop_pooled_connection() {
        let (ep, store) = endpoint(true);
        store.put_file("/srv/data/a.txt", b"1");
        assert!(ep.exists("a.txt").unwrap());
        store.fail_always(Op::Stat, RemoteFault::Connection("reset".into()));
        assert!(ep.exists("a.txt").is_err());
        assert_eq!(ep.pool().idle_count(), 0);
        store.clear_faults();
        assert!(ep.exists("a.txt").unwrap());
        assert_eq!(store.connects(), 2);
    }
}
