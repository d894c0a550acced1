use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TransferError;

/// Temp sibling used while a download is being written locally.
fn local_temp_path(target: &Path) -> PathBuf {
    let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let tmp_name = format!("{}.hfpart.{}", name, std::process::id());
    match target.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

/// Write `data` to `target` through a temp file + fsync + rename, so a reader
/// never observes a partially written file. Missing parent directories are
/// created. The temp file is removed on any failure.
pub fn write_local_atomic(target: &Path, data: &[u8]) -> Result<(), TransferError> {
    if let Some(parent) = target.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| TransferError::local_io(parent, e))?;
    }
    let tmp_path = local_temp_path(target);
    let res = (|| -> std::io::Result<()> {
        let mut f = File::create(&tmp_path)?;
        f.write_all(data)?;
        f.sync_all()?;
        Ok(())
    })();
    if let Err(e) = res {
        tracing::debug!("local write failed for {}: {}", tmp_path.display(), e);
        let _ = std::fs::remove_file(&tmp_path);
        return Err(TransferError::local_io(&tmp_path, e));
    }
    if let Err(e) = atomic_rename_with_retries(&tmp_path, target) {
        tracing::debug!(
            "rename temp {} -> {} failed: {}",
            tmp_path.display(),
            target.display(),
            e
        );
        let _ = std::fs::remove_file(&tmp_path);
        return Err(TransferError::local_io(target, e));
    }
    Ok(())
}

/// Rename `tmp_path` over `target`, retrying a few times after removing the
/// target when the platform refuses to replace it (Windows semantics).
pub(crate) fn atomic_rename_with_retries(tmp_path: &Path, target: &Path) -> std::io::Result<()> {
    let mut attempts = 0;
    loop {
        match std::fs::rename(tmp_path, target) {
            Ok(()) => return Ok(()),
            Err(e) => {
                let kind = e.kind();
                if attempts < 2
                    && (kind == std::io::ErrorKind::AlreadyExists
                        || kind == std::io::ErrorKind::PermissionDenied)
                {
                    let _ = std::fs::remove_file(target);
                    std::thread::sleep(Duration::from_millis(50));
                    attempts += 1;
                    continue;
                }
                return Err(e);
            }
        }
    }
}

pub(crate) fn read_local(path: &Path) -> Result<Vec<u8>, TransferError> {
    std::fs::read(path).map_err(|e| TransferError::local_io(path, e))
}
