use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::TransferError;
use crate::events::{TransferEvent, TransferObserver};

#[derive(Serialize)]
struct LoggedEvent<'a> {
    ts: String,
    #[serde(flatten)]
    event: &'a TransferEvent,
}

/// Observer that appends failure events to a JSON Lines file, one object per
/// line with a UTC timestamp.
pub struct JsonlEventLog {
    path: PathBuf,
    file: Mutex<File>,
    include_success: bool,
}

impl JsonlEventLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| TransferError::local_io(parent, e))?;
        }
        // 追加模式，不覆盖之前的记录
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TransferError::local_io(&path, e))?;
        Ok(Self { path, file: Mutex::new(file), include_success: false })
    }

    /// Also record completion and progress events.
    pub fn with_success_events(mut self) -> Self {
        self.include_success = true;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: &TransferEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(&LoggedEvent {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        })?;
        let mut f = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(f, "{}", line)
    }
}

impl TransferObserver for JsonlEventLog {
    fn on_event(&self, event: &TransferEvent) {
        if !self.include_success && !event.is_error() {
            return;
        }
        if let Err(e) = self.append(event) {
            tracing::warn!("failed to append event to {}: {}", self.path.display(), e);
        }
    }
}
