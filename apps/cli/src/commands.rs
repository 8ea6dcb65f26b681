//! Command handlers

use anyhow::{bail, Context, Result};
use modfetch::downloader::config::DownloadConfig;
use modfetch::downloader::reconcile::reconcile as reconcile_manifest;
use modfetch::{
    auth, format_bytes, CancellationSignal, ConsoleProgressSink, DownloadOrchestrator, Manifest, RunOutcome,
    SessionCookies,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Exit status for a run stopped by Ctrl-C
const EXIT_CANCELLED: u8 = 130;

pub struct DownloadOptions {
    pub manifest: PathBuf,
    pub destination: PathBuf,
    pub cookies: PathBuf,
    pub api_base: String,
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub verbose: bool,
}

impl DownloadOptions {
    fn config(&self) -> Result<DownloadConfig> {
        DownloadConfig::builder()
            .api_base(self.api_base.clone())
            .connect_timeout(self.connect_timeout_secs.map(Duration::from_secs))
            .request_timeout(self.timeout_secs.map(Duration::from_secs))
            .build()
            .context("Invalid download configuration")
    }
}

pub async fn download(options: DownloadOptions) -> Result<ExitCode> {
    if !auth::is_authenticated(&options.cookies) {
        bail!(
            "Not logged in: no cookie file at {}. Log in first or pass --cookies",
            options.cookies.display()
        );
    }

    let config = options.config()?;
    let cookies = Arc::new(SessionCookies::load(&options.cookies).await?);
    let client = auth::build_client(&config, cookies)?;
    let manifest = Manifest::load(&options.manifest).await?;
    info!(
        "{} archives in manifest, {} in total",
        manifest.len(),
        format_bytes(manifest.total_size())
    );

    let cancel = CancellationSignal::new();
    let orchestrator = DownloadOrchestrator::new(
        config,
        client,
        Arc::new(ConsoleProgressSink::new(options.verbose)),
        cancel.clone(),
    )?;

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current chunk");
                cancel.cancel();
            }
        })
    };

    let result = orchestrator.run(&manifest, &options.destination).await;
    ctrl_c.abort();

    match result {
        Ok(report) => match report.outcome {
            RunOutcome::Completed if report.abandoned.is_empty() => Ok(ExitCode::SUCCESS),
            RunOutcome::Completed => {
                warn!("Run again to retry: {}", report.abandoned.join(", "));
                Ok(ExitCode::SUCCESS)
            }
            RunOutcome::Cancelled => Ok(ExitCode::from(EXIT_CANCELLED)),
        },
        Err(e) => {
            error!(category = e.category(), "Download run aborted");
            eprint!("{}", e.detailed_report());
            Ok(ExitCode::FAILURE)
        }
    }
}

pub async fn reconcile(manifest: &Path, destination: &Path) -> Result<ExitCode> {
    let manifest = Manifest::load(manifest).await?;
    let reconciliation = reconcile_manifest(&manifest, destination, &ConsoleProgressSink::new(false)).await?;

    for pending in &reconciliation.queue {
        if pending.offset > 0 {
            println!(
                "  resume   {} ({} of {})",
                pending.entry.file_name,
                format_bytes(pending.offset),
                format_bytes(pending.entry.size)
            );
        } else {
            println!("  download {} ({})", pending.entry.file_name, format_bytes(pending.entry.size));
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn auth_status(cookies: &Path) -> ExitCode {
    if auth::is_authenticated(cookies) {
        println!("Logged in (session at {})", cookies.display());
        ExitCode::SUCCESS
    } else {
        println!("Not logged in");
        ExitCode::FAILURE
    }
}

pub async fn auth_logout(cookies: &Path) -> Result<ExitCode> {
    if auth::logout(cookies).await? {
        println!("Logged out");
    } else {
        println!("Not logged in");
    }
    Ok(ExitCode::SUCCESS)
}
