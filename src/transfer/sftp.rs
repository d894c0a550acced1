use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use crate::config::{RemoteCredentials, TransferConfig};
use crate::error::RemoteFault;
use crate::transfer::remote_fs::{Connector, RemoteFs, RemoteStat};

// libssh2 SFTP status codes
const FX_NO_SUCH_FILE: i32 = 2;
const FX_PERMISSION_DENIED: i32 = 3;
const FX_NO_SUCH_PATH: i32 = 10;
const FX_FILE_ALREADY_EXISTS: i32 = 11;
const FX_NOT_A_DIRECTORY: i32 = 19;

/// Translate an `ssh2::Error` into the transport-neutral fault kinds.
pub(crate) fn classify(err: &ssh2::Error) -> RemoteFault {
    match err.code() {
        ssh2::ErrorCode::SFTP(FX_NO_SUCH_FILE) | ssh2::ErrorCode::SFTP(FX_NO_SUCH_PATH) => {
            RemoteFault::NotFound
        }
        ssh2::ErrorCode::SFTP(FX_FILE_ALREADY_EXISTS) => RemoteFault::AlreadyExists,
        ssh2::ErrorCode::SFTP(FX_NOT_A_DIRECTORY) => RemoteFault::NotADirectory,
        ssh2::ErrorCode::SFTP(FX_PERMISSION_DENIED) => {
            RemoteFault::PermissionDenied(err.message().to_string())
        }
        ssh2::ErrorCode::SFTP(_) => RemoteFault::Protocol(err.to_string()),
        ssh2::ErrorCode::Session(_) => RemoteFault::Connection(err.to_string()),
    }
}

fn io_fault(e: std::io::Error) -> RemoteFault {
    use std::io::ErrorKind;
    match e.kind() {
        ErrorKind::NotFound => RemoteFault::NotFound,
        ErrorKind::PermissionDenied => RemoteFault::PermissionDenied(e.to_string()),
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::TimedOut
        | ErrorKind::UnexpectedEof => RemoteFault::Connection(e.to_string()),
        _ => RemoteFault::Protocol(e.to_string()),
    }
}

/// Opens authenticated SFTP sessions for one set of credentials.
pub struct SftpConnector {
    creds: RemoteCredentials,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl SftpConnector {
    pub fn new(creds: RemoteCredentials, config: &TransferConfig) -> Self {
        if config.passive_mode {
            // SFTP 只有一条复用通道，主动/被动模式对其无意义
            tracing::debug!("passive_mode requested; SFTP uses a single multiplexed channel");
        }
        Self {
            creds,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs.max(1)),
            io_timeout: Duration::from_secs(config.io_timeout_secs.max(1)),
        }
    }

    /// 创建并配置 TCP 连接
    fn create_tcp_connection(&self) -> Result<TcpStream, RemoteFault> {
        let addr = self.creds.addr();
        let mut addrs =
            addr.to_socket_addrs().map_err(|e| RemoteFault::Connection(format!("{}: {}", addr, e)))?;
        let sock = addrs
            .next()
            .ok_or_else(|| RemoteFault::Connection(format!("无法解析地址: {}", addr)))?;
        let tcp = TcpStream::connect_timeout(&sock, self.connect_timeout)
            .map_err(|e| RemoteFault::Connection(format!("{}: {}", addr, e)))?;
        let _ = tcp.set_read_timeout(Some(self.io_timeout));
        let _ = tcp.set_write_timeout(Some(self.io_timeout));
        Ok(tcp)
    }

    fn authenticate(&self, sess: &mut ssh2::Session) -> Result<(), RemoteFault> {
        let user = self.creds.username();
        if !self.creds.password().is_empty() {
            sess.userauth_password(user, self.creds.password())
                .map_err(|e| RemoteFault::Connection(format!("SSH 认证失败: {}", e)))?;
            return Ok(());
        }
        // 无密码：依次尝试 agent 与默认私钥
        if sess.userauth_agent(user).is_ok() && sess.authenticated() {
            return Ok(());
        }
        if let Some(home) = dirs::home_dir() {
            for name in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                let p = home.join(".ssh").join(name);
                if p.exists() {
                    let _ = sess.userauth_pubkey_file(user, None, &p, None);
                    if sess.authenticated() {
                        return Ok(());
                    }
                }
            }
        }
        Err(RemoteFault::Connection(format!("SSH 认证失败: {}", self.creds.addr())))
    }
}

impl Connector for SftpConnector {
    type Conn = SftpConnection;

    fn connect(&self) -> Result<SftpConnection, RemoteFault> {
        let tcp = self.create_tcp_connection()?;
        let mut session = ssh2::Session::new().map_err(|e| classify(&e))?;
        session.set_tcp_stream(tcp);
        session.set_timeout(self.io_timeout.as_millis().min(u32::MAX as u128) as u32);
        session.handshake().map_err(|e| {
            RemoteFault::Connection(format!("SSH 握手失败: {}: {}", self.creds.addr(), e))
        })?;
        self.authenticate(&mut session)?;
        let sftp = session.sftp().map_err(|e| classify(&e))?;
        tracing::debug!("opened SFTP session to {}", self.creds.addr());
        Ok(SftpConnection { sftp, _session: session })
    }

    fn describe(&self) -> String {
        format!("sftp://{}@{}", self.creds.username(), self.creds.addr())
    }
}

/// An authenticated session plus its SFTP subsystem channel.
pub struct SftpConnection {
    sftp: ssh2::Sftp,
    // sftp 依赖 session 存活
    _session: ssh2::Session,
}

impl RemoteFs for SftpConnection {
    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteFault> {
        let st = self.sftp.stat(Path::new(path)).map_err(|e| classify(&e))?;
        Ok(RemoteStat { is_dir: st.is_dir(), size: st.size, mtime: st.mtime })
    }

    fn read_dir(&self, path: &str) -> Result<Vec<String>, RemoteFault> {
        let entries = self.sftp.readdir(Path::new(path)).map_err(|e| classify(&e))?;
        let names = entries
            .into_iter()
            .filter_map(|(p, _)| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .filter(|n| n != "." && n != "..")
            .collect();
        Ok(names)
    }

    fn mkdir(&self, path: &str) -> Result<(), RemoteFault> {
        self.sftp.mkdir(Path::new(path), 0o755).map_err(|e| classify(&e))
    }

    fn rmdir(&self, path: &str) -> Result<(), RemoteFault> {
        self.sftp.rmdir(Path::new(path)).map_err(|e| classify(&e))
    }

    fn unlink(&self, path: &str) -> Result<(), RemoteFault> {
        self.sftp.unlink(Path::new(path)).map_err(|e| classify(&e))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), RemoteFault> {
        let flags = ssh2::RenameFlags::ATOMIC | ssh2::RenameFlags::OVERWRITE;
        self.sftp.rename(Path::new(from), Path::new(to), Some(flags)).map_err(|e| classify(&e))
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, RemoteFault> {
        let mut f = self.sftp.open(Path::new(path)).map_err(|e| classify(&e))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).map_err(io_fault)?;
        Ok(buf)
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), RemoteFault> {
        let mut f = self.sftp.create(Path::new(path)).map_err(|e| classify(&e))?;
        f.write_all(data).map_err(io_fault)?;
        f.flush().map_err(io_fault)?;
        Ok(())
    }
}
