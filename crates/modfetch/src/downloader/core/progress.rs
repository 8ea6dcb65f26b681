//! Progress reporting for download runs

use std::sync::{Arc, Mutex};

use crate::downloader::core::metrics::{RunOutcome, RunReport};
use crate::downloader::transfer::TransferOutcome;

const SIZE_UNITS: [&str; 9] = ["B", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Render a byte count with binary units, e.g. `12.34MB`
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", value, SIZE_UNITS[unit])
}

/// Observer of a download run
///
/// Every method is called from whichever task is doing the work, so
/// implementations own any marshalling to their presentation layer. Calls for a
/// single artifact arrive strictly in order, and only one artifact is ever
/// transferring at a time.
pub trait ProgressSink: Send + Sync {
    /// Number of artifacts that still need network work
    fn set_total_count(&self, count: usize);

    /// A transfer is starting (or restarting) for `file_name`
    fn set_current(&self, file_name: &str, total_size: u64, already_downloaded: u64);

    /// Bytes of the current artifact on disk, with the instantaneous rate in
    /// bytes per second when it could be measured
    fn update_progress(&self, bytes_downloaded: u64, rate_bps: Option<f64>);

    fn on_reconciled(&self, _pending: usize, _already_complete: usize) {}
    fn on_artifact_finished(&self, _file_name: &str, _outcome: &TransferOutcome) {}
    fn on_run_finished(&self, _report: &RunReport) {}
}

/// Sink that ignores every event
#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn set_total_count(&self, _count: usize) {}
    fn set_current(&self, _file_name: &str, _total_size: u64, _already_downloaded: u64) {}
    fn update_progress(&self, _bytes_downloaded: u64, _rate_bps: Option<f64>) {}
}

#[derive(Debug, Default)]
struct ConsoleState {
    total_count: usize,
    index: usize,
    file_name: String,
    total_size: u64,
    last_decile: u64,
}

/// Human readable progress on stdout
///
/// Without `verbose` a progress line is printed every ten percent; with it,
/// after every chunk.
#[derive(Debug, Default)]
pub struct ConsoleProgressSink {
    pub verbose: bool,
    state: Mutex<ConsoleState>,
}

impl ConsoleProgressSink {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            state: Mutex::new(ConsoleState::default()),
        }
    }
}

impl ProgressSink for ConsoleProgressSink {
    fn set_total_count(&self, count: usize) {
        if let Ok(mut state) = self.state.lock() {
            state.total_count = count;
            state.index = 0;
        }
    }

    fn set_current(&self, file_name: &str, total_size: u64, already_downloaded: u64) {
        let Ok(mut state) = self.state.lock() else { return };

        if state.file_name != file_name {
            state.index += 1;
        }
        state.file_name = file_name.to_string();
        state.total_size = total_size;
        state.last_decile = already_downloaded.saturating_mul(10) / total_size.max(1);

        if already_downloaded > 0 {
            println!(
                "[{}/{}] Resuming {} at {} of {}",
                state.index,
                state.total_count,
                file_name,
                format_bytes(already_downloaded),
                format_bytes(total_size)
            );
        } else {
            println!(
                "[{}/{}] Downloading {} ({})",
                state.index,
                state.total_count,
                file_name,
                format_bytes(total_size)
            );
        }
    }

    fn update_progress(&self, bytes_downloaded: u64, rate_bps: Option<f64>) {
        let Ok(mut state) = self.state.lock() else { return };

        let total = state.total_size.max(1);
        let decile = bytes_downloaded.saturating_mul(10) / total;
        if !self.verbose && decile <= state.last_decile {
            return;
        }
        state.last_decile = decile;

        let percent = (bytes_downloaded as f64 / total as f64) * 100.0;
        let rate = match rate_bps {
            Some(rate) => format!("{}/s", format_bytes(rate as u64)),
            None => "-".to_string(),
        };
        println!(
            "    {}: {:.1}% ({}/{}, {})",
            state.file_name,
            percent,
            format_bytes(bytes_downloaded),
            format_bytes(state.total_size),
            rate
        );
    }

    fn on_reconciled(&self, pending: usize, already_complete: usize) {
        println!("{} already complete, {} to download", already_complete, pending);
    }

    fn on_artifact_finished(&self, file_name: &str, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Completed { size } => {
                println!("Finished {} ({})", file_name, format_bytes(*size));
            }
            TransferOutcome::Cancelled => {
                println!("Stopped {}; the partial file is kept for the next run", file_name);
            }
            TransferOutcome::Abandoned { reason } => {
                eprintln!("Skipped {}: {}", file_name, reason);
            }
        }
    }

    fn on_run_finished(&self, report: &RunReport) {
        println!("{}", run_summary(report));
        if !report.abandoned.is_empty() {
            eprintln!("{} artifacts need another run: {}", report.abandoned.len(), report.abandoned.join(", "));
        }
    }
}

/// One-line summary of a finished run
pub fn run_summary(report: &RunReport) -> String {
    let metrics = &report.metrics;
    let elapsed = report.duration.as_secs_f64();
    match report.outcome {
        RunOutcome::Completed => format!(
            "Run complete in {:.1}s: {} downloaded ({:.0}% of attempted), {} already present, {} transferred",
            elapsed,
            metrics.completed,
            metrics.success_rate() * 100.0,
            report.already_complete,
            format_bytes(metrics.bytes_transferred)
        ),
        RunOutcome::Cancelled => format!(
            "Run cancelled after {:.1}s and {} downloads ({} transferred)",
            elapsed,
            metrics.completed,
            format_bytes(metrics.bytes_transferred)
        ),
    }
}

/// Sink that forwards every event to several sinks
#[derive(Default)]
pub struct CompositeProgressSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl std::fmt::Debug for CompositeProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeProgressSink")
            .field("sinks_count", &self.sinks.len())
            .finish()
    }
}

impl CompositeProgressSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for CompositeProgressSink {
    fn set_total_count(&self, count: usize) {
        for sink in &self.sinks {
            sink.set_total_count(count);
        }
    }

    fn set_current(&self, file_name: &str, total_size: u64, already_downloaded: u64) {
        for sink in &self.sinks {
            sink.set_current(file_name, total_size, already_downloaded);
        }
    }

    fn update_progress(&self, bytes_downloaded: u64, rate_bps: Option<f64>) {
        for sink in &self.sinks {
            sink.update_progress(bytes_downloaded, rate_bps);
        }
    }

    fn on_reconciled(&self, pending: usize, already_complete: usize) {
        for sink in &self.sinks {
            sink.on_reconciled(pending, already_complete);
        }
    }

    fn on_artifact_finished(&self, file_name: &str, outcome: &TransferOutcome) {
        for sink in &self.sinks {
            sink.on_artifact_finished(file_name, outcome);
        }
    }

    fn on_run_finished(&self, report: &RunReport) {
        for sink in &self.sinks {
            sink.on_run_finished(report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::core::metrics::DownloadMetricsSnapshot;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0B");
        assert_eq!(format_bytes(512), "512.00B");
        assert_eq!(format_bytes(1024), "1.00KB");
        assert_eq!(format_bytes(1536), "1.50KB");
        assert_eq!(format_bytes(12_939_428), "12.34MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00GB");
    }

    #[derive(Default)]
    struct Counting {
        totals: AtomicUsize,
        updates: AtomicUsize,
        last_bytes: AtomicU64,
    }

    impl ProgressSink for Counting {
        fn set_total_count(&self, count: usize) {
            self.totals.store(count, Ordering::SeqCst);
        }
        fn set_current(&self, _file_name: &str, _total_size: u64, _already_downloaded: u64) {}
        fn update_progress(&self, bytes_downloaded: u64, _rate_bps: Option<f64>) {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.last_bytes.store(bytes_downloaded, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_composite_forwards_to_every_sink() {
        let first = Arc::new(Counting::default());
        let second = Arc::new(Counting::default());
        let composite = CompositeProgressSink::new()
            .add_sink(first.clone())
            .add_sink(second.clone())
            .add_sink(Arc::new(NullProgressSink));

        composite.set_total_count(3);
        composite.update_progress(100, Some(50.0));
        composite.update_progress(200, None);

        for sink in [&first, &second] {
            assert_eq!(sink.totals.load(Ordering::SeqCst), 3);
            assert_eq!(sink.updates.load(Ordering::SeqCst), 2);
            assert_eq!(sink.last_bytes.load(Ordering::SeqCst), 200);
        }
        assert!(format!("{:?}", composite).contains("sinks_count: 3"));
    }

    #[test]
    fn test_console_sink_tracks_artifact_index() {
        let sink = ConsoleProgressSink::new(false);
        sink.set_total_count(2);
        sink.set_current("a.7z", 1000, 0);
        sink.set_current("a.7z", 1000, 0);
        sink.update_progress(500, Some(1024.0));
        sink.set_current("b.7z", 2000, 1000);

        let state = sink.state.lock().unwrap();
        assert_eq!(state.index, 2);
        assert_eq!(state.file_name, "b.7z");
        assert_eq!(state.last_decile, 5);
    }

    #[test]
    fn test_run_summary_reports_duration_and_success_rate() {
        let report = RunReport {
            outcome: RunOutcome::Completed,
            pending: 4,
            already_complete: 1,
            abandoned: vec!["bad.7z".to_string()],
            metrics: DownloadMetricsSnapshot {
                completed: 3,
                abandoned: 1,
                bytes_transferred: 3 * 1024 * 1024,
                ..Default::default()
            },
            duration: std::time::Duration::from_millis(12_340),
        };

        assert_eq!(
            run_summary(&report),
            "Run complete in 12.3s: 3 downloaded (75% of attempted), 1 already present, 3.00MB transferred"
        );

        let cancelled = RunReport {
            outcome: RunOutcome::Cancelled,
            abandoned: Vec::new(),
            ..report
        };
        assert_eq!(run_summary(&cancelled), "Run cancelled after 12.3s and 3 downloads (3.00MB transferred)");
    }
}
