use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{TransferError, error_chain_text};
use crate::transfer::endpoint::RemoteEndpoint;
use crate::transfer::remote_fs::Connector;

pub const PROBE_FILE: &str = "hostferry-probe.txt";
pub const PROBE_DIR: &str = "hostferry-probe-dir";
pub const PROBE_NESTED_FILE: &str = "hostferry-probe-dir/level1/level2/probe.txt";
const PROBE_CONTENT: &str = "hostferry connectivity probe\n";

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Outcome of a connectivity probe: `error` holds the first failing step's
/// diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub success: bool,
    pub error: Option<String>,
}

impl ProbeReport {
    fn ok() -> Self {
        Self { success: true, error: None }
    }

    fn failed(msg: String) -> Self {
        Self { success: false, error: Some(msg) }
    }
}

/// Removes the scratch file when the probe returns.
struct LocalScratch(PathBuf);

impl LocalScratch {
    fn create() -> Result<Self, TransferError> {
        let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir()
            .join(format!("hostferry-probe-{}-{}-{}.txt", std::process::id(), seq, unique_suffix()));
        std::fs::write(&path, PROBE_CONTENT).map_err(|e| TransferError::local_io(&path, e))?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for LocalScratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

fn unique_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

fn step<T>(
    status: &mut dyn FnMut(&str),
    label: &str,
    f: impl FnOnce() -> Result<T, String>,
) -> Result<T, String> {
    status(&format!("{} ...", label));
    let res = f();
    match &res {
        Ok(_) => status(&format!("{}: ok", label)),
        Err(e) => status(&format!("{}: failed ({})", label, e)),
    }
    res
}

fn describe(what: &str, err: &TransferError) -> String {
    format!("{}: {}", what, error_chain_text(err))
}

/// Run every remote primitive once, in order, and stop at the first step that
/// fails. `status` is called before and after each step.
pub fn run_probe<C: Connector>(
    endpoint: &RemoteEndpoint<C>,
    mut status: impl FnMut(&str),
) -> ProbeReport {
    // 清理上次残留（失败不影响探测）
    let _ = endpoint.delete_file(PROBE_FILE, false);
    let _ = endpoint.delete_directory_recursive(PROBE_DIR, false);

    let status: &mut dyn FnMut(&str) = &mut status;
    let result = (|| -> Result<(), String> {
        let scratch = step(status, "creating local test file", || {
            LocalScratch::create().map_err(|e| describe("cannot create local test file", &e))
        })?;

        step(status, "uploading test file", || {
            endpoint
                .upload_local(scratch.path(), PROBE_FILE)
                .map(|_| ())
                .map_err(|e| describe("cannot create files", &e))
        })?;

        step(status, "downloading test file", || {
            match endpoint.read_file_as_text(PROBE_FILE, true) {
                Ok(Some(text)) if text == PROBE_CONTENT => Ok(()),
                Ok(_) => Err("integrity mismatch: downloaded content differs from uploaded".to_string()),
                Err(e) => Err(describe("cannot download files", &e)),
            }
        })?;

        step(status, "checking test file exists", || match endpoint.exists(PROBE_FILE) {
            Ok(true) => Ok(()),
            Ok(false) => Err("cannot check existence: uploaded file reported missing".to_string()),
            Err(e) => Err(describe("cannot check existence", &e)),
        })?;

        step(status, "deleting test file", || {
            endpoint.delete_file(PROBE_FILE, true).map_err(|e| describe("cannot delete files", &e))
        })?;

        step(status, "uploading into nested directories", || {
            endpoint
                .upload_local(scratch.path(), PROBE_NESTED_FILE)
                .map(|_| ())
                .map_err(|e| describe("cannot create directories", &e))
        })?;

        step(status, "checking nested file exists", || match endpoint.exists(PROBE_NESTED_FILE) {
            Ok(true) => Ok(()),
            Ok(false) => Err("cannot create directories: nested file reported missing".to_string()),
            Err(e) => Err(describe("cannot check existence", &e)),
        })?;

        step(status, "deleting nested directories", || {
            endpoint
                .delete_directory_recursive(PROBE_DIR, true)
                .map_err(|e| describe("cannot delete directories", &e))
        })?;

        step(status, "confirming test file is gone", || match endpoint.exists(PROBE_FILE) {
            Ok(false) => Ok(()),
            Ok(true) => Err("cannot delete files: test file still present after delete".to_string()),
            Err(e) => Err(describe("cannot check existence", &e)),
        })?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            tracing::info!("connectivity probe passed");
            ProbeReport::ok()
        }
        Err(msg) => {
            tracing::warn!("connectivity probe failed: {}", msg);
            ProbeReport::failed(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteFault;
    use crate::transfer::endpoint::EndpointOptions;
    use crate::transfer::memory::{MemoryConnector, Op};

    fn endpoint() -> (RemoteEndpoint<MemoryConnector>, MemoryConnector) {
        let store = MemoryConnector::new("/probe/root");
        (RemoteEndpoint::new(store.clone(), EndpointOptions::new("/probe/root")), store)
    }

    #[test]
    fn healthy_store_passes_and_leaves_nothing_behind() {
        let (ep, store) = endpoint();
        let mut messages = Vec::new();
        let report = run_probe(&ep, |m| messages.push(m.to_string()));
        assert_eq!(report, ProbeReport { success: true, error: None });
        assert_eq!(messages.len(), 18);
        assert!(!store.paths().iter().any(|p| p.contains("hostferry-probe")));
    }

    #[test]
    fn missing_mkdir_permission_is_reported() {
        let (ep, store) = endpoint();
        store.fail_always(Op::Mkdir, RemoteFault::PermissionDenied("mkdir".into()));
        let report = run_probe(&ep, |_| {});
        assert!(!report.success);
        assert!(report.error.unwrap().starts_with("cannot create directories"));
    }

    // 在指定步骤开始时注入故障，返回报告和全部状态消息
    fn run_with_fault_at(
        label: &str,
        inject: impl Fn(&MemoryConnector),
    ) -> (ProbeReport, Vec<String>, MemoryConnector) {
        let (ep, store) = endpoint();
        let start = format!("{} ...", label);
        let mut messages = Vec::new();
        let report = run_probe(&ep, |m| {
            if m == start {
                inject(&store);
            }
            messages.push(m.to_string());
        });
        (report, messages, store)
    }

    fn assert_stopped_at(report: &ProbeReport, messages: &[String], label: &str, prefix: &str) {
        assert!(!report.success);
        let err = report.error.as_deref().unwrap_or_default();
        assert!(err.starts_with(prefix), "{}", err);
        let last = messages.last().map(String::as_str).unwrap_or_default();
        assert!(last.starts_with(&format!("{}: failed", label)), "{}", last);
    }

    #[test]
    fn unreadable_store_is_reported_as_download_failure() {
        let (report, messages, _) = run_with_fault_at("uploading test file", |s| {
            s.fail_always(Op::Read, RemoteFault::PermissionDenied("read".into()))
        });
        assert_stopped_at(&report, &messages, "downloading test file", "cannot download files");
        assert_eq!(messages.len(), 6);
    }

    #[test]
    fn failing_stat_is_reported_as_existence_failure() {
        let (report, messages, _) = run_with_fault_at("checking test file exists", |s| {
            s.fail_always(Op::Stat, RemoteFault::Protocol("stat refused".into()))
        });
        assert_stopped_at(&report, &messages, "checking test file exists", "cannot check existence");
        assert!(report.error.unwrap().contains("stat refused"));
        assert_eq!(messages.len(), 8);
    }

    #[test]
    fn failing_stat_on_nested_file_is_reported() {
        let (report, messages, _) = run_with_fault_at("checking nested file exists", |s| {
            s.fail_always(Op::Stat, RemoteFault::Protocol("stat refused".into()))
        });
        assert_stopped_at(&report, &messages, "checking nested file exists", "cannot check existence");
        assert_eq!(messages.len(), 14);
    }

    #[test]
    fn missing_rmdir_permission_is_reported() {
        let (ep, store) = endpoint();
        store.fail_always(Op::Rmdir, RemoteFault::PermissionDenied("rmdir".into()));
        let mut messages = Vec::new();
        let report = run_probe(&ep, |m| messages.push(m.to_string()));
        assert_stopped_at(&report, &messages, "deleting nested directories", "cannot delete directories");
        assert_eq!(messages.len(), 16);
        assert!(store.calls(Op::Rmdir) > 0);
    }

    #[test]
    fn file_still_present_after_delete_is_reported() {
        let (report, messages, store) = run_with_fault_at("confirming test file is gone", |s| {
            s.put_file("/probe/root/hostferry-probe.txt", b"ghost")
        });
        assert_stopped_at(&report, &messages, "confirming test file is gone", "cannot delete files");
        assert!(report.error.unwrap().contains("still present"));
        assert_eq!(messages.len(), 18);
        assert!(store.contains("/probe/root/hostferry-probe.txt"));
    }

    #[test]
    fn scratch_files_get_distinct_names() {
        let a = LocalScratch::create().unwrap();
        let b = LocalScratch::create().unwrap();
        assert_ne!(a.path(), b.path());
        let kept = a.path().to_path_buf();
        drop(a);
        assert!(!kept.exists());
    }

    #[test]
    fn corrupted_download_is_integrity_mismatch() {
        let (ep, store) = endpoint();
        let mut tampered = false;
        // 上传后篡改内容
        let report = run_probe(&ep, |m| {
            if m == "downloading test file ..." && !tampered {
                store.put_file("/probe/root/hostferry-probe.txt", b"different");
                tampered = true;
            }
        });
        assert!(tampered);
        assert!(report.error.unwrap().starts_with("integrity mismatch"));
    }
}
