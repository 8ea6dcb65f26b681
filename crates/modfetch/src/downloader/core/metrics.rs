//! Counters for a download run and the report handed back when it ends

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one run
///
/// Atomic so the spawned transfer task and the orchestrator can both record
/// into the same instance.
#[derive(Debug, Default)]
pub struct DownloadMetrics {
    pub completed: AtomicU64,
    pub already_complete: AtomicU64,
    pub resumed: AtomicU64,
    pub abandoned: AtomicU64,
    pub hash_retries: AtomicU64,
    pub bytes_transferred: AtomicU64,
}

impl DownloadMetrics {
    /// Record an artifact downloaded and verified in this run
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record artifacts found complete (or promoted) by reconciliation
    pub fn record_already_complete(&self, count: u64) {
        self.already_complete.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a transfer that started from a non-zero offset
    pub fn record_resumed(&self) {
        self.resumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a restart from zero after a digest mismatch
    pub fn record_hash_retry(&self) {
        self.hash_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record body bytes received from the network
    pub fn record_bytes(&self, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> DownloadMetricsSnapshot {
        DownloadMetricsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            already_complete: self.already_complete.load(Ordering::Relaxed),
            resumed: self.resumed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            hash_retries: self.hash_retries.load(Ordering::Relaxed),
            bytes_transferred: self.bytes_transferred.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of download metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadMetricsSnapshot {
    pub completed: u64,
    pub already_complete: u64,
    pub resumed: u64,
    pub abandoned: u64,
    pub hash_retries: u64,
    pub bytes_transferred: u64,
}

impl DownloadMetricsSnapshot {
    /// Share of attempted artifacts that finished, from 0.0 to 1.0
    pub fn success_rate(&self) -> f64 {
        let attempted = self.completed + self.abandoned;
        if attempted == 0 {
            0.0
        } else {
            self.completed as f64 / attempted as f64
        }
    }
}

/// How a run ended when it did not abort
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every queued artifact was processed (some may have been abandoned)
    Completed,
    /// The cancellation signal stopped the run early
    Cancelled,
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Entries that needed network work after reconciliation
    pub pending: usize,
    /// Entries satisfied by reconciliation alone
    pub already_complete: usize,
    /// File names left for a future run
    pub abandoned: Vec<String>,
    pub metrics: DownloadMetricsSnapshot,
    pub duration: std::time::Duration,
}

impl RunReport {
    /// True when every manifest entry is now on disk
    pub fn is_complete(&self) -> bool {
        self.outcome == RunOutcome::Completed && self.abandoned.is_empty()
    }
}
