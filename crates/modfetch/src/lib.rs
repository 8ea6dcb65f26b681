//! Modfetch Library
//!
//! Resumable, hash-verified downloading of Nexus Mods archives listed in a
//! manifest. Interrupted downloads continue from their `.part` file on the
//! next run, completed archives are never fetched twice, and a run can be
//! cancelled at any point without leaving a corrupt file behind.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use modfetch::{
//!     auth, CancellationSignal, ConsoleProgressSink, DownloadConfig,
//!     DownloadOrchestrator, Manifest, RunOutcome, SessionCookies,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> modfetch::Result<()> {
//! let config = DownloadConfig::default();
//! let cookies = Arc::new(SessionCookies::load(Path::new("cookies.json")).await?);
//! let client = auth::build_client(&config, cookies)?;
//!
//! let cancel = CancellationSignal::new();
//! let orchestrator = DownloadOrchestrator::new(
//!     config,
//!     client,
//!     Arc::new(ConsoleProgressSink::new(false)),
//!     cancel.clone(),
//! )?;
//!
//! let manifest = Manifest::load(Path::new("modlist.json")).await?;
//! let report = orchestrator.run(&manifest, Path::new("downloads")).await?;
//! if report.outcome == RunOutcome::Completed && !report.abandoned.is_empty() {
//!     println!("{} archives need another run", report.abandoned.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Reconciliation**: completed files are skipped, full-size part files are
//!   verified and promoted, oversized or corrupt ones discarded
//! - **Resume**: range requests continue from the bytes already on disk
//! - **Verification**: streaming xxHash64 compared with the manifest hash
//! - **Bounded retry**: a mismatching artifact is retried once from zero
//! - **Cancellation**: a shared signal stops the run after the current chunk
//! - **Progress tracking**: per-chunk progress with instantaneous rates

pub mod auth;
pub mod downloader;

// Re-export commonly used types for convenience
pub use auth::SessionCookies;
pub use downloader::{
    format_bytes, CancellationSignal, CompositeProgressSink, ConsoleProgressSink, DownloadConfig, DownloadError,
    DownloadOrchestrator, Manifest, ManifestEntry, NullProgressSink, ProgressSink, Result, RunOutcome, RunReport,
    TransferOutcome,
};
