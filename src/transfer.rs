// transfer module: remote primitives, connection pooling and local file helpers
pub mod endpoint;
pub mod enumeration;
pub mod helpers;
pub mod local;
pub mod memory;
pub mod pool;
pub mod remote_fs;
pub mod sftp;

pub use endpoint::{EndpointOptions, RemoteEndpoint, UPLOAD_TEMP_SUFFIX, UploadOutcome};
pub use helpers::normalize_path;
pub use memory::{FaultPlan, MemoryConnector, Op};
pub use remote_fs::{Connector, RemoteFs, RemoteStat};
pub use sftp::SftpConnector;
