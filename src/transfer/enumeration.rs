use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::TransferError;

/// A regular file found under a local directory, with its `/`-separated path
/// relative to that directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub relative: String,
}

/// Every regular file below `root`, recursively, in a stable (sorted) order.
/// Symlinks are not followed.
pub fn enumerate_local_files(root: &Path) -> Result<Vec<LocalFile>, TransferError> {
    let md = std::fs::metadata(root).map_err(|e| TransferError::local_io(root, e))?;
    if !md.is_dir() {
        return Err(TransferError::Validation(format!("源不是目录: {}", root.display())));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            let io = e.into_io_error().unwrap_or_else(|| std::io::Error::other("walk failed"));
            TransferError::local_io(&path, io)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let relative = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push(LocalFile { path: entry.path().to_path_buf(), relative });
    }
    Ok(files)
}
