//! Tracing subscriber setup: stderr output plus an optional daily-rolling
//! log file.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::TransferError;

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Default filter directive when `RUST_LOG` is unset, e.g. `"info"`.
    pub level: String,
    /// Directory for `hostferry.log.YYYY-MM-DD` files; `None` disables file output.
    pub log_dir: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { level: "info".to_string(), log_dir: None, ansi: true }
    }
}

/// Keeps the non-blocking file writer flushing. Drop it last.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn init_logging(opts: &LogOptions) -> Result<LogGuard, TransferError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&opts.level))
        .map_err(|e| TransferError::Config(format!("invalid log level '{}': {}", opts.level, e)))?;

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_ansi(opts.ansi).with_target(true);

    let (file_layer, guard) = match &opts.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| TransferError::local_io(dir, e))?;
            let appender = tracing_appender::rolling::daily(dir, "hostferry.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_thread_names(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TransferError::Config(format!("logging already initialized: {}", e)))?;

    Ok(LogGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let opts = LogOptions { level: "debug".into(), log_dir: Some(dir.path().join("logs")), ansi: false };
        let first = init_logging(&opts);
        let second = init_logging(&LogOptions::default());
        assert!(first.is_ok() || second.is_err());
        assert!(matches!(second, Err(TransferError::Config(_))));
        assert!(dir.path().join("logs").is_dir());
    }
}
