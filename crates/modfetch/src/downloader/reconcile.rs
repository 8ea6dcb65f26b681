//! Reconciliation of a manifest against the destination directory
//!
//! Before any network activity each entry is classified from what is on disk:
//!
//! | on disk                          | action                               |
//! |----------------------------------|--------------------------------------|
//! | `name` (with or without `.part`) | done; a stray `.part` is removed     |
//! | `.part` of exactly `Size` bytes  | hash it: promote to `name` or delete |
//! | `.part` larger than `Size`       | delete, then download from zero      |
//! | `.part` smaller than `Size`      | resume from the part's size          |
//! | nothing                          | download from zero                   |

use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::downloader::core::files::{atomic_rename, file_size, remove_if_exists};
use crate::downloader::core::validation::file_matches;
use crate::downloader::core::{DownloadError, FileOperation, ProgressSink, Result};
use crate::downloader::manifest::{Manifest, ManifestEntry};

/// What reconciliation decided for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// The final file already exists
    Complete,
    /// A full-size part file verified and was renamed into place
    Promoted,
    /// Needs a transfer starting at `offset`
    Pending { offset: u64 },
}

/// An entry that still needs network work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingArtifact {
    pub entry: ManifestEntry,
    /// Bytes already in the part file
    pub offset: u64,
}

/// Result of a reconciliation pass
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Entries to transfer, in manifest order
    pub queue: VecDeque<PendingArtifact>,
    /// Names of entries already satisfied on disk
    pub complete: Vec<String>,
}

impl Reconciliation {
    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn complete_count(&self) -> usize {
        self.complete.len()
    }
}

/// Classify every manifest entry against `dir`, repairing part files on the way
///
/// The sink receives the pending and complete counts once the pass is done.
pub async fn reconcile(manifest: &Manifest, dir: &Path, sink: &dyn ProgressSink) -> Result<Reconciliation> {
    ensure_directory(dir).await?;

    let mut reconciliation = Reconciliation::default();
    for entry in manifest.entries() {
        match reconcile_entry(entry, dir).await? {
            EntryState::Complete | EntryState::Promoted => {
                reconciliation.complete.push(entry.file_name.clone());
            }
            EntryState::Pending { offset } => {
                reconciliation.queue.push_back(PendingArtifact {
                    entry: entry.clone(),
                    offset,
                });
            }
        }
    }

    info!(
        "Reconciled {} entries: {} to download, {} already complete",
        manifest.len(),
        reconciliation.pending_count(),
        reconciliation.complete_count()
    );
    sink.on_reconciled(reconciliation.pending_count(), reconciliation.complete_count());
    Ok(reconciliation)
}

/// Classify a single entry
pub async fn reconcile_entry(entry: &ManifestEntry, dir: &Path) -> Result<EntryState> {
    let destination = entry.destination(dir);
    let part = entry.part_path(dir);

    if file_size(&destination).await?.is_some() {
        if remove_if_exists(&part).await? {
            info!("Removed leftover part file for completed {}", entry.file_name);
        }
        debug!("{} already complete", entry.file_name);
        return Ok(EntryState::Complete);
    }

    let Some(part_size) = file_size(&part).await? else {
        debug!("{} not started", entry.file_name);
        return Ok(EntryState::Pending { offset: 0 });
    };

    if part_size == entry.size {
        if file_matches(&part, &entry.hash).await? {
            atomic_rename(&part, &destination).await?;
            info!("Promoted verified part file for {}", entry.file_name);
            return Ok(EntryState::Promoted);
        }
        warn!(
            file_name = %entry.file_name,
            size = part_size,
            "Full-size part file failed hash verification, deleting"
        );
        remove_if_exists(&part).await?;
        return Ok(EntryState::Pending { offset: 0 });
    }

    if part_size > entry.size {
        warn!(
            file_name = %entry.file_name,
            part_size,
            expected = entry.size,
            "Part file is larger than the artifact, deleting"
        );
        remove_if_exists(&part).await?;
        return Ok(EntryState::Pending { offset: 0 });
    }

    info!("{} can resume at {} of {} bytes", entry.file_name, part_size, entry.size);
    Ok(EntryState::Pending { offset: part_size })
}

async fn ensure_directory(dir: &Path) -> Result<()> {
    let metadata = tokio::fs::metadata(dir)
        .await
        .map_err(|e| DownloadError::file_system(dir, FileOperation::Metadata, e))?;
    if !metadata.is_dir() {
        return Err(DownloadError::file_system(
            dir,
            FileOperation::Metadata,
            std::io::Error::other("destination is not a directory"),
        ));
    }
    Ok(())
}
