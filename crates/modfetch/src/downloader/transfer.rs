//! Resumable, hash-verified transfer of a single artifact
//!
//! Bytes are appended to `<name>.part` and folded into a running xxHash64
//! that is primed with whatever the part file already held. The part file is
//! renamed to `<name>` only once the digest matches the manifest hash, so a
//! cancelled or interrupted transfer always leaves a valid prefix behind for
//! the next run to resume from.

use futures::StreamExt;
use reqwest::header::{ACCEPT_ENCODING, RANGE};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::files::{atomic_rename, file_size, remove_if_exists};
use crate::downloader::core::validation::file_matches;
use crate::downloader::core::{
    CancellationSignal, DownloadError, DownloadMetrics, FileOperation, IncrementalHasher, ProgressSink, Result,
};
use crate::downloader::manifest::ManifestEntry;

/// Why an artifact was given up on for this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbandonReason {
    /// The server declared a body length other than the bytes still missing
    LengthMismatch { expected: u64, actual: Option<u64> },
    /// Every attempt produced content whose digest did not match
    HashMismatch { attempts: u32, expected: String, actual: String },
    /// The server sent more bytes than the artifact can hold
    Overflow { expected: u64, received: u64 },
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbandonReason::LengthMismatch { expected, actual: Some(actual) } => {
                write!(f, "server declared {} bytes, expected {}", actual, expected)
            }
            AbandonReason::LengthMismatch { expected, actual: None } => {
                write!(f, "server declared no length, expected {} bytes", expected)
            }
            AbandonReason::HashMismatch { attempts, expected, actual } => {
                write!(f, "hash mismatch after {} attempts (expected {}, got {})", attempts, expected, actual)
            }
            AbandonReason::Overflow { expected, received } => {
                write!(f, "received {} bytes for a {} byte artifact", received, expected)
            }
        }
    }
}

/// How one artifact's transfer ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Verified and renamed to its final name
    Completed { size: u64 },
    /// Stopped by the cancellation signal; the part file is kept
    Cancelled,
    /// Given up on for this run; a later run picks it up again
    Abandoned { reason: AbandonReason },
}

/// Transfers artifacts into one destination directory
///
/// Cheap to clone; clones share the client, sink, signal and metrics.
#[derive(Clone)]
pub struct ResumableTransfer {
    client: Client,
    config: Arc<DownloadConfig>,
    destination: PathBuf,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationSignal,
    metrics: Arc<DownloadMetrics>,
}

impl std::fmt::Debug for ResumableTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableTransfer")
            .field("destination", &self.destination)
            .field("chunk_size", &self.config.chunk_size)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// State of one attempt's body stream
struct ChunkWriter<'a> {
    file: fs::File,
    part: &'a Path,
    hasher: IncrementalHasher,
    downloaded: u64,
    last_chunk_at: Instant,
}

impl ResumableTransfer {
    pub fn new(
        client: Client,
        config: Arc<DownloadConfig>,
        destination: PathBuf,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationSignal,
        metrics: Arc<DownloadMetrics>,
    ) -> Self {
        Self {
            client,
            config,
            destination,
            sink,
            cancel,
            metrics,
        }
    }

    /// Transfer `entry` from `url`, resuming any part file already on disk
    ///
    /// Per-artifact failures come back as [`TransferOutcome::Abandoned`].
    /// An `Err` means a network or I/O failure the run cannot continue past,
    /// and the cancellation signal has been set.
    pub async fn transfer(&self, entry: &ManifestEntry, url: &str) -> Result<TransferOutcome> {
        match self.run(entry, url).await {
            Ok(outcome) => {
                self.sink.on_artifact_finished(&entry.file_name, &outcome);
                Ok(outcome)
            }
            Err(e) => {
                error!(file_name = %entry.file_name, category = e.category(), "Transfer failed: {}", e);
                self.cancel.cancel();
                Err(e)
            }
        }
    }

    async fn run(&self, entry: &ManifestEntry, url: &str) -> Result<TransferOutcome> {
        let destination = entry.destination(&self.destination);
        let part = entry.part_path(&self.destination);
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(TransferOutcome::Cancelled);
            }
            attempt += 1;

            let already = self.usable_offset(entry, &part, &destination).await?;
            if already == entry.size {
                self.metrics.record_completed();
                return Ok(TransferOutcome::Completed { size: entry.size });
            }
            if already > 0 && attempt == 1 {
                self.metrics.record_resumed();
                info!("Resuming {} at {} of {} bytes", entry.file_name, already, entry.size);
            }

            self.sink.set_current(&entry.file_name, entry.size, already);

            let hasher = if already > 0 {
                IncrementalHasher::from_file(&part).await?
            } else {
                IncrementalHasher::new()
            };

            let mut request = self.client.get(url).header(ACCEPT_ENCODING, "identity");
            if already > 0 {
                request = request.header(RANGE, format!("bytes={}-", already));
                debug!("Requesting range: bytes={}-", already);
            }

            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(TransferOutcome::Cancelled),
                response = request.send() => response.map_err(|e| DownloadError::http(url, e))?,
            };

            if !response.status().is_success() {
                return Err(DownloadError::HttpStatus {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                });
            }

            let remaining = entry.size - already;
            let declared = response.content_length();
            if declared != Some(remaining) {
                error!(
                    file_name = %entry.file_name,
                    expected = remaining,
                    actual = ?declared,
                    "Server length does not match the missing bytes, abandoning for this run"
                );
                return Ok(self.abandon(AbandonReason::LengthMismatch {
                    expected: remaining,
                    actual: declared,
                }));
            }

            let file = if already > 0 {
                fs::OpenOptions::new()
                    .append(true)
                    .open(&part)
                    .await
                    .map_err(|e| DownloadError::file_system(&part, FileOperation::Write, e))?
            } else {
                fs::File::create(&part)
                    .await
                    .map_err(|e| DownloadError::file_system(&part, FileOperation::Create, e))?
            };

            let mut writer = ChunkWriter {
                file,
                part: &part,
                hasher,
                downloaded: already,
                last_chunk_at: Instant::now(),
            };

            let chunk_size = self.config.chunk_size;
            let mut buffer: Vec<u8> = Vec::with_capacity(chunk_size);
            let mut stream = response.bytes_stream();

            loop {
                let piece = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        writer.close().await?;
                        info!("Cancelled {} at {} bytes", entry.file_name, writer.downloaded);
                        return Ok(TransferOutcome::Cancelled);
                    }
                    piece = stream.next() => piece,
                };
                let Some(piece) = piece else { break };
                let piece = piece.map_err(|e| DownloadError::http(url, e))?;

                let received = writer.downloaded + (buffer.len() + piece.len()) as u64;
                if received > entry.size {
                    drop(writer);
                    remove_if_exists(&part).await?;
                    error!(
                        file_name = %entry.file_name,
                        expected = entry.size,
                        received,
                        "Server sent more bytes than the artifact holds, discarding part file"
                    );
                    return Ok(self.abandon(AbandonReason::Overflow {
                        expected: entry.size,
                        received,
                    }));
                }

                buffer.extend_from_slice(&piece);
                while buffer.len() >= chunk_size {
                    let rest = buffer.split_off(chunk_size);
                    let chunk = std::mem::replace(&mut buffer, rest);
                    if self.write_chunk(&mut writer, &chunk).await? {
                        writer.close().await?;
                        info!("Cancelled {} at {} bytes", entry.file_name, writer.downloaded);
                        return Ok(TransferOutcome::Cancelled);
                    }
                }
            }

            if !buffer.is_empty() && self.write_chunk(&mut writer, &buffer).await? {
                writer.close().await?;
                return Ok(TransferOutcome::Cancelled);
            }
            writer.close().await?;
            let ChunkWriter { file, hasher, downloaded, .. } = writer;
            drop(file);

            if hasher.matches(&entry.hash) {
                atomic_rename(&part, &destination).await?;
                self.metrics.record_completed();
                info!("Downloaded and verified {} ({} bytes)", entry.file_name, downloaded);
                return Ok(TransferOutcome::Completed { size: downloaded });
            }

            let actual = hasher.reference_encoding();
            remove_if_exists(&part).await?;

            if attempt >= self.config.max_hash_attempts {
                error!(
                    file_name = %entry.file_name,
                    attempts = attempt,
                    expected = %entry.hash,
                    actual = %actual,
                    size = downloaded,
                    hashed = hasher.bytes_hashed(),
                    "Hash mismatch on every attempt, abandoning for this run"
                );
                return Ok(self.abandon(AbandonReason::HashMismatch {
                    attempts: attempt,
                    expected: entry.hash.clone(),
                    actual,
                }));
            }

            self.metrics.record_hash_retry();
            warn!(
                file_name = %entry.file_name,
                attempt,
                expected = %entry.hash,
                actual = %actual,
                "Hash mismatch, restarting from zero"
            );
        }
    }

    /// Bytes of the part file that can be resumed from
    ///
    /// A part that already holds the whole artifact is promoted when it
    /// verifies and discarded otherwise, as is one that is too large.
    async fn usable_offset(&self, entry: &ManifestEntry, part: &Path, destination: &Path) -> Result<u64> {
        let already = file_size(part).await?.unwrap_or(0);
        if already < entry.size {
            return Ok(already);
        }

        if already == entry.size && file_matches(part, &entry.hash).await? {
            atomic_rename(part, destination).await?;
            info!("Promoted verified part file for {}", entry.file_name);
            return Ok(entry.size);
        }

        warn!(
            file_name = %entry.file_name,
            part_size = already,
            expected = entry.size,
            "Discarding unusable part file"
        );
        remove_if_exists(part).await?;
        Ok(0)
    }

    /// Append, hash and report one chunk; returns true when cancelled
    async fn write_chunk(&self, writer: &mut ChunkWriter<'_>, chunk: &[u8]) -> Result<bool> {
        writer
            .file
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::file_system(writer.part, FileOperation::Write, e))?;
        writer.hasher.update(chunk);
        writer.downloaded += chunk.len() as u64;
        self.metrics.record_bytes(chunk.len() as u64);

        let now = Instant::now();
        let elapsed = now.duration_since(writer.last_chunk_at).as_secs_f64();
        writer.last_chunk_at = now;
        let rate = (elapsed > 0.0).then(|| chunk.len() as f64 / elapsed);
        self.sink.update_progress(writer.downloaded, rate);

        Ok(self.cancel.is_cancelled())
    }

    fn abandon(&self, reason: AbandonReason) -> TransferOutcome {
        self.metrics.record_abandoned();
        TransferOutcome::Abandoned { reason }
    }
}

impl ChunkWriter<'_> {
    /// Flush and sync so everything written so far is durable
    async fn close(&mut self) -> Result<()> {
        self.file
            .flush()
            .await
            .map_err(|e| DownloadError::file_system(self.part, FileOperation::Write, e))?;
        self.file
            .sync_all()
            .await
            .map_err(|e| DownloadError::file_system(self.part, FileOperation::Write, e))?;
        Ok(())
    }
}
