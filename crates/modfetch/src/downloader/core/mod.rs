//! Core types used throughout the downloader system
//!
//! Leaf modules the rest of the engine depends on: errors, hashing, progress
//! reporting, file helpers, metrics and cancellation.

pub mod cancel;
pub mod error;
pub mod files;
pub mod metrics;
pub mod progress;
pub mod validation;

// Re-export main types for convenience
pub use cancel::CancellationSignal;
pub use error::{DownloadError, FileOperation, Result};
pub use metrics::{DownloadMetrics, DownloadMetricsSnapshot, RunOutcome, RunReport};
pub use progress::{
    format_bytes, CompositeProgressSink, ConsoleProgressSink, NullProgressSink, ProgressSink,
};
pub use validation::{encode_reference, verify, IncrementalHasher};
