//! Modfetch CLI - resumable Nexus Mods downloads from a manifest

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Download every archive listed in a manifest, resuming where the last run stopped
#[derive(Parser)]
#[command(name = "modfetch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output (debug logs and per-chunk progress)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true, env = "MODFETCH_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Clone)]
struct TargetArgs {
    /// Manifest JSON (FileName, Size, Hash, GameID, FileID per entry)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Directory the archives are written to
    #[arg(short, long)]
    destination: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
struct SessionArgs {
    /// Cookie file written by the login flow
    #[arg(long, env = "MODFETCH_COOKIES", default_value = "cookies.json")]
    cookies: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Download everything the manifest lists that is not on disk yet
    Download {
        #[command(flatten)]
        target: TargetArgs,

        #[command(flatten)]
        session: SessionArgs,

        /// Website base URL
        #[arg(long, env = "MODFETCH_API_BASE", default_value = modfetch::downloader::config::DEFAULT_API_BASE)]
        api_base: String,

        /// Connect timeout in seconds
        #[arg(long, env = "MODFETCH_CONNECT_TIMEOUT_SECS")]
        connect_timeout_secs: Option<u64>,

        /// Whole-request timeout in seconds, body included
        #[arg(long, env = "MODFETCH_TIMEOUT_SECS")]
        timeout_secs: Option<u64>,
    },

    /// Check the destination against the manifest without downloading
    Reconcile {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Session management
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Show whether a login session is present
    Status {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Remove the login session
    Logout {
        #[command(flatten)]
        session: SessionArgs,
    },
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Download {
            target,
            session,
            api_base,
            connect_timeout_secs,
            timeout_secs,
        } => {
            let options = commands::DownloadOptions {
                manifest: target.manifest,
                destination: target.destination,
                cookies: session.cookies,
                api_base,
                connect_timeout_secs,
                timeout_secs,
                verbose: cli.verbose,
            };
            commands::download(options).await
        }
        Commands::Reconcile { target } => commands::reconcile(&target.manifest, &target.destination).await,
        Commands::Auth { action } => match action {
            AuthAction::Status { session } => Ok(commands::auth_status(&session.cookies)),
            AuthAction::Logout { session } => commands::auth_logout(&session.cookies).await,
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
