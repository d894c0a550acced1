/// Classification of a failed remote primitive. Produced once by the transport
/// adapter so nothing above `transfer::remote_fs` inspects protocol status codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteFault {
    #[error("no such file or directory")]
    NotFound,
    #[error("file or directory already exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// 连接层错误（握手、认证、断线），连接应被丢弃
    #[error("connection error: {0}")]
    Connection(String),
    #[error("remote error: {0}")]
    Protocol(String),
}

impl RemoteFault {
    /// Whether the connection that produced this fault must not be reused.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, RemoteFault::Connection(_))
    }
}

/// Errors surfaced by the endpoint, the client facade and the probe.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("remote path not found: {0}")]
    NotFound(String),
    #[error("{op} failed for {path}")]
    Remote {
        op: &'static str,
        path: String,
        #[source]
        source: RemoteFault,
    },
    #[error("local file error: {path}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("remote file is not valid UTF-8 text: {0}")]
    InvalidText(String),
    #[error("transfer client has been disposed")]
    Disposed,
    #[error("invalid argument: {0}")]
    Validation(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransferError {
    pub(crate) fn remote(op: &'static str, path: &str, source: RemoteFault) -> Self {
        TransferError::Remote { op, path: path.to_string(), source }
    }

    pub(crate) fn local_io(path: &std::path::Path, source: std::io::Error) -> Self {
        TransferError::LocalIo { path: path.display().to_string(), source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TransferError::NotFound(_)
                | TransferError::Remote { source: RemoteFault::NotFound, .. }
        )
    }
}

/// Flatten an error and every nested `source()` into one line, outermost first.
pub fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut cur = err.source();
    while let Some(inner) = cur {
        let msg = inner.to_string();
        // thiserror 透明包装时外层与内层文本可能相同，去重
        if parts.last() != Some(&msg) {
            parts.push(msg);
        }
        cur = inner.source();
    }
    parts.join(" -> ")
}
