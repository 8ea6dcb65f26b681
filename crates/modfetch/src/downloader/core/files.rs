//! File operation utilities for part files and their promotion

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::downloader::core::error::{DownloadError, FileOperation, Result};

/// Path of the in-progress file for `dest_path`
///
/// The suffix is appended rather than substituted so `SkyUI.7z` becomes
/// `SkyUI.7z.part`.
pub fn part_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Size of the regular file at `path`, or `None` when there is none
pub async fn file_size(path: &Path) -> Result<Option<u64>> {
    match fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(DownloadError::file_system(path, FileOperation::Metadata, e)),
    }
}

/// Remove `path`, treating an already missing file as success
///
/// Returns whether a file was actually removed.
pub async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(DownloadError::file_system(path, FileOperation::Delete, e)),
    }
}

/// Atomically rename a part file to its final destination
///
/// The file either exists completely under its final name or not at all.
pub async fn atomic_rename(temp_path: &Path, dest_path: &Path) -> Result<()> {
    fs::rename(temp_path, dest_path)
        .await
        .map_err(|e| DownloadError::file_system(temp_path, FileOperation::Rename, e))?;
    debug!("Atomically renamed {} to {}", temp_path.display(), dest_path.display());
    Ok(())
}
