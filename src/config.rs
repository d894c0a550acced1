use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::TransferError;
use crate::transfer::helpers::with_trailing_slash;

const DEFAULT_SFTP_PORT: u16 = 22;

/// Client construction parameters, persisted as JSON.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TransferConfig {
    /// Protocol-qualified remote root, e.g. `sftp://files.example.com:22/srv/data`.
    pub root: String,
    pub username: String,
    pub password: String,
    pub workers: usize,
    pub max_connections: usize,
    pub skip_if_exists: bool,
    pub passive_mode: bool,
    pub keep_alive: bool,
    pub idle_poll_ms: u64,
    pub failure_backoff_ms: u64,
    pub connect_timeout_secs: u64,
    pub io_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            username: String::new(),
            password: String::new(),
            workers: 3,
            max_connections: 4,
            skip_if_exists: true,
            passive_mode: false,
            keep_alive: true,
            idle_poll_ms: 500,
            failure_backoff_ms: 1000,
            connect_timeout_secs: 10,
            io_timeout_secs: 30,
        }
    }
}

impl TransferConfig {
    /// `~/.hostferry/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".".to_owned() + env!("CARGO_PKG_NAME")).join("config.json"))
    }

    pub fn read_from<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置失败: {}", path.display()))?;
        let cfg: TransferConfig = serde_json::from_str(&raw)
            .with_context(|| format!("解析配置失败: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("创建配置目录失败: {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body).with_context(|| format!("写入配置失败: {}", path.display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.workers == 0 {
            return Err(TransferError::Config("workers must be at least 1".into()));
        }
        if self.max_connections == 0 {
            return Err(TransferError::Config("max_connections must be at least 1".into()));
        }
        Ok(())
    }

    pub fn credentials(&self) -> Result<RemoteCredentials, TransferError> {
        RemoteCredentials::parse(&self.root, &self.username, &self.password)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }
}

/// Remote address and login. Immutable once parsed; `root_path` always ends
/// with `/`.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    host: String,
    port: u16,
    root_path: String,
    username: String,
    password: String,
}

impl RemoteCredentials {
    pub fn parse(root: &str, username: &str, password: &str) -> Result<Self, TransferError> {
        let url = url::Url::parse(root.trim())
            .map_err(|e| TransferError::Config(format!("invalid remote root '{}': {}", root, e)))?;
        match url.scheme() {
            "sftp" | "ssh" => {}
            other => {
                return Err(TransferError::Config(format!(
                    "unsupported scheme '{}' in remote root (expected sftp://)",
                    other
                )));
            }
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| TransferError::Config(format!("remote root has no host: {}", root)))?;
        let path = if url.path().is_empty() { "/" } else { url.path() };
        // url 保证 path 以 '/' 开头；统一以 '/' 结尾
        let root_path = with_trailing_slash(path);
        Ok(Self {
            host: host.to_string(),
            port: url.port().unwrap_or(DEFAULT_SFTP_PORT),
            root_path,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("root_path", &self.root_path)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
