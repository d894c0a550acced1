use crate::error::RemoteFault;

/// What a `stat` call learned about a remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub is_dir: bool,
    pub size: Option<u64>,
    pub mtime: Option<u64>,
}

/// One live connection to the remote store. Every call performs exactly one
/// primitive; paths are absolute and already resolved against the root.
/// Implementors must be `Send` so pooled connections can move between worker
/// threads.
pub trait RemoteFs: Send {
    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteFault>;
    /// Immediate child names of a directory (no `.`/`..`).
    fn read_dir(&self, path: &str) -> Result<Vec<String>, RemoteFault>;
    fn mkdir(&self, path: &str) -> Result<(), RemoteFault>;
    fn rmdir(&self, path: &str) -> Result<(), RemoteFault>;
    fn unlink(&self, path: &str) -> Result<(), RemoteFault>;
    /// Rename `from` to `to`, replacing `to` if the store allows it.
    fn rename(&self, from: &str, to: &str) -> Result<(), RemoteFault>;
    fn read(&self, path: &str) -> Result<Vec<u8>, RemoteFault>;
    /// Create or truncate `path` and write the whole payload.
    fn write(&self, path: &str, data: &[u8]) -> Result<(), RemoteFault>;
}

/// Opens fresh connections for the pool.
pub trait Connector: Send + Sync + 'static {
    type Conn: RemoteFs;

    fn connect(&self) -> Result<Self::Conn, RemoteFault>;

    /// Human-readable target used in log lines.
    fn describe(&self) -> String;
}
