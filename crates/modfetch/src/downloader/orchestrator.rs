//! Sequencing of a whole download run
//!
//! The run is a shallow two-stage pipeline. The control flow resolves the
//! direct URL for the next artifact while the previous artifact's transfer is
//! still running on its own task, then joins that task before spawning the
//! next one. At most one transfer ever writes to disk.
//!
//! ```text
//! reconcile ─▶ resolve(1) ─▶ spawn(1) ─▶ resolve(2) ─▶ join(1) ─▶ spawn(2) ─▶ … ─▶ join(n)
//! ```

use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::downloader::api::NexusApi;
use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{
    CancellationSignal, DownloadError, DownloadMetrics, ProgressSink, Result, RunOutcome,
    RunReport,
};
use crate::downloader::manifest::Manifest;
use crate::downloader::reconcile::{reconcile, Reconciliation};
use crate::downloader::transfer::{ResumableTransfer, TransferOutcome};

/// A spawned transfer that has not been joined yet
struct InFlight {
    file_name: String,
    handle: JoinHandle<Result<TransferOutcome>>,
}

/// Drives reconciliation, URL resolution and transfers for one manifest
pub struct DownloadOrchestrator {
    config: Arc<DownloadConfig>,
    client: Client,
    api: NexusApi,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationSignal,
    metrics: Arc<DownloadMetrics>,
}

impl std::fmt::Debug for DownloadOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadOrchestrator")
            .field("api_base", &self.config.api_base)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl DownloadOrchestrator {
    /// Create an orchestrator using `client` for every request
    ///
    /// The client should carry the session cookies, see
    /// [`build_client`](crate::auth::build_client).
    pub fn new(
        config: DownloadConfig,
        client: Client,
        sink: Arc<dyn ProgressSink>,
        cancel: CancellationSignal,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let api = NexusApi::new(client.clone(), config.clone());
        Ok(Self {
            config,
            client,
            api,
            sink,
            cancel,
            metrics: Arc::new(DownloadMetrics::default()),
        })
    }

    /// Handle to the run's cancellation signal
    pub fn cancellation(&self) -> CancellationSignal {
        self.cancel.clone()
    }

    /// Reconcile `manifest` against `destination` and download what is missing
    ///
    /// Returns a report when the run completed or was cancelled. A fatal
    /// failure sets the cancellation signal, waits for the in-flight transfer
    /// and comes back as `Err`.
    pub async fn run(&self, manifest: &Manifest, destination: &Path) -> Result<RunReport> {
        let started = Instant::now();
        let reconciliation = match reconcile(manifest, destination, self.sink.as_ref()).await {
            Ok(reconciliation) => reconciliation,
            Err(e) => {
                error!(category = e.category(), "Reconciliation failed: {}", e);
                self.cancel.cancel();
                return Err(e);
            }
        };
        self.run_queue(reconciliation, destination, started).await
    }

    async fn run_queue(&self, reconciliation: Reconciliation, destination: &Path, started: Instant) -> Result<RunReport> {
        let pending = reconciliation.pending_count();
        let already_complete = reconciliation.complete_count();
        self.metrics.record_already_complete(already_complete as u64);
        self.sink.set_total_count(pending);

        let transfer = ResumableTransfer::new(
            self.client.clone(),
            self.config.clone(),
            destination.to_path_buf(),
            self.sink.clone(),
            self.cancel.clone(),
            self.metrics.clone(),
        );

        let mut queue = reconciliation.queue;
        let mut in_flight: Option<InFlight> = None;
        let mut abandoned = Vec::new();

        while let Some(next) = queue.pop_front() {
            if self.cancel.is_cancelled() {
                break;
            }

            let resolved = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                resolved = self.api.resolve_download_url(&next.entry) => Some(resolved),
            };
            let url = match resolved {
                None => break,
                Some(Ok(url)) => url,
                Some(Err(e)) => {
                    self.cancel.cancel();
                    if let Err(join_error) = self.join(in_flight.take(), &mut abandoned).await {
                        warn!("In-flight transfer also failed: {}", join_error);
                    }
                    return Err(e);
                }
            };

            if self.cancel.is_cancelled() {
                break;
            }
            self.join(in_flight.take(), &mut abandoned).await?;
            if self.cancel.is_cancelled() {
                break;
            }

            info!("Starting {} ({} of {} bytes on disk)", next.entry.file_name, next.offset, next.entry.size);
            let file_name = next.entry.file_name.clone();
            let task = transfer.clone();
            let handle = tokio::spawn(async move { task.transfer(&next.entry, &url).await });
            in_flight = Some(InFlight { file_name, handle });
        }

        self.join(in_flight.take(), &mut abandoned).await?;

        let outcome = if self.cancel.is_cancelled() {
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        };
        let report = RunReport {
            outcome,
            pending,
            already_complete,
            abandoned,
            metrics: self.metrics.snapshot(),
            duration: started.elapsed(),
        };

        match report.outcome {
            RunOutcome::Completed if report.abandoned.is_empty() => info!("All downloads completed"),
            RunOutcome::Completed => warn!(
                "Run finished with {} abandoned artifacts: {}",
                report.abandoned.len(),
                report.abandoned.join(", ")
            ),
            RunOutcome::Cancelled => info!("Run cancelled"),
        }
        self.sink.on_run_finished(&report);
        Ok(report)
    }

    /// Wait for the in-flight transfer and record its outcome
    async fn join(&self, in_flight: Option<InFlight>, abandoned: &mut Vec<String>) -> Result<()> {
        let Some(InFlight { file_name, handle }) = in_flight else {
            return Ok(());
        };

        let outcome = match handle.await {
            Ok(result) => result?,
            Err(e) => {
                self.cancel.cancel();
                return Err(DownloadError::TaskFailed {
                    file_name,
                    reason: e.to_string(),
                });
            }
        };

        if let TransferOutcome::Abandoned { reason } = &outcome {
            warn!("Abandoned {} for this run: {}", file_name, reason);
            abandoned.push(file_name);
        }
        Ok(())
    }
}
