//! Downloader module
//!
//! Manifest loading, reconciliation against the destination directory,
//! URL resolution, resumable transfers and the orchestration of a run.

pub mod api;
pub mod config;
pub mod core;
pub mod manifest;
pub mod orchestrator;
pub mod reconcile;
pub mod transfer;

// Re-export main types for convenience
pub use api::NexusApi;
pub use config::{DownloadConfig, DownloadConfigBuilder};
pub use core::{
    format_bytes, CancellationSignal, CompositeProgressSink, ConsoleProgressSink, DownloadError, DownloadMetrics,
    DownloadMetricsSnapshot, FileOperation, IncrementalHasher, NullProgressSink, ProgressSink, Result, RunOutcome,
    RunReport,
};
pub use manifest::{Manifest, ManifestEntry};
pub use orchestrator::DownloadOrchestrator;
pub use reconcile::{reconcile, EntryState, PendingArtifact, Reconciliation};
pub use transfer::{AbandonReason, ResumableTransfer, TransferOutcome};
