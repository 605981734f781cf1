//! Filesystem helpers with path-carrying errors.

use crate::{NimbusError, Result};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Write a string to a file, creating parent directories as needed.
pub fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| NimbusError::io_with_path(e, parent))?;
    }
    std::fs::write(path, contents).map_err(|e| NimbusError::io_with_path(e, path))
}

/// Copy a single file, replacing any existing destination.
pub fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| NimbusError::io_with_path(e, parent))?;
    }
    let _ = std::fs::remove_file(dst);
    std::fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| NimbusError::io_with_path(e, src))
}

/// Recursively copy a directory tree into `dst` (created if absent).
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| NimbusError::Io {
            message: e.to_string(),
            path: Some(src.to_path_buf()),
            source: e.into_io_error(),
        })?;
        // walkdir yields paths under its root, so the prefix always strips
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)
                .map_err(|e| NimbusError::io_with_path(e, &target))?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| NimbusError::io_with_path(e, parent))?;
            }
            std::fs::copy(entry.path(), &target)
                .map_err(|e| NimbusError::io_with_path(e, entry.path()))?;
        }
    }
    Ok(())
}

/// Remove a file or directory tree, swallowing failures. Used by cleanup
/// paths that are documented best-effort.
pub fn remove_best_effort(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(e) = result {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("best-effort remove of {} failed: {e}", path.display());
        }
    }
}
