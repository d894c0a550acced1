use std::path::PathBuf;

use crate::events::TransferEvent;
use crate::transfer::helpers::normalize_local_key;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKindTag {
    Upload,
    Download,
    DeleteDir,
}

/// Identity of a job: two jobs are the same iff kind and key path match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub kind: JobKindTag,
    pub path: String,
}

impl JobKey {
    /// Uploads are keyed by their remote target.
    pub fn upload(remote: &str) -> Self {
        Self { kind: JobKindTag::Upload, path: remote.to_string() }
    }

    /// Downloads are keyed by their local target.
    pub fn download(local: &str) -> Self {
        Self { kind: JobKindTag::Download, path: normalize_local_key(local) }
    }

    pub fn delete_dir(remote: &str) -> Self {
        Self { kind: JobKindTag::DeleteDir, path: remote.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Upload { local: PathBuf, remote: String },
    Download { remote: String, local: PathBuf },
    DeleteDir { remote: String },
}

/// One queued unit of work plus its attempt counter.
#[derive(Debug, Clone)]
pub struct Job {
    kind: JobKind,
    attempts: u32,
}

impl Job {
    pub fn upload(local: impl Into<PathBuf>, remote: impl Into<String>) -> Self {
        Self { kind: JobKind::Upload { local: local.into(), remote: remote.into() }, attempts: 0 }
    }

    pub fn download(remote: impl Into<String>, local: impl Into<PathBuf>) -> Self {
        Self { kind: JobKind::Download { remote: remote.into(), local: local.into() }, attempts: 0 }
    }

    pub fn delete_dir(remote: impl Into<String>) -> Self {
        Self { kind: JobKind::DeleteDir { remote: remote.into() }, attempts: 0 }
    }

    pub fn kind(&self) -> &JobKind {
        &self.kind
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Count one execution attempt; saturates instead of wrapping.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    pub fn key(&self) -> JobKey {
        match &self.kind {
            JobKind::Upload { remote, .. } => JobKey::upload(remote),
            JobKind::Download { local, .. } => JobKey::download(&local.to_string_lossy()),
            JobKind::DeleteDir { remote } => JobKey::delete_dir(remote),
        }
    }

    pub(crate) fn completed_event(&self) -> TransferEvent {
        match &self.kind {
            JobKind::Upload { local, remote } => {
                TransferEvent::UploadComplete { local: local.clone(), remote: remote.clone() }
            }
            JobKind::Download { remote, local } => {
                TransferEvent::DownloadComplete { remote: remote.clone(), local: local.clone() }
            }
            JobKind::DeleteDir { remote } => {
                TransferEvent::DeleteDirectoryComplete { path: remote.clone() }
            }
        }
    }

    pub(crate) fn failed_event(&self, error: String) -> TransferEvent {
        let attempts = self.attempts;
        match &self.kind {
            JobKind::Upload { local, remote } => TransferEvent::UploadError {
                local: local.clone(),
                remote: remote.clone(),
                error,
                attempts,
            },
            JobKind::Download { remote, local } => TransferEvent::DownloadError {
                remote: remote.clone(),
                local: local.clone(),
                error,
                attempts,
            },
            JobKind::DeleteDir { remote } => {
                TransferEvent::DeleteDirectoryError { path: remote.clone(), error, attempts }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
