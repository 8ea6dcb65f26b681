//! Error types for the download engine with context for diagnostics
//!
//! Only run-aborting conditions surface as errors. Per-artifact failures that
//! leave the run going (a length mismatch, a hash mismatch past the retry cap)
//! are reported as [`TransferOutcome`](crate::downloader::TransferOutcome)
//! values instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a download run
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Transport-level failure talking to the origin or the CDN
    #[error("HTTP request to '{url}' failed")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("HTTP request to '{url}' returned status {status}")]
    HttpStatus {
        url: String,
        status: u16,
    },

    /// File system I/O errors with file context
    #[error("File operation failed while {operation} '{path}'")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// The manifest could not be read or contains an unusable entry
    #[error("Invalid manifest '{path}': {reason}")]
    InvalidManifest {
        path: PathBuf,
        reason: String,
    },

    /// The origin did not hand out a usable direct URL for an artifact
    #[error("Could not resolve a direct download URL for '{file_name}': {reason}")]
    UrlResolution {
        file_name: String,
        reason: String,
    },

    /// URL parsing errors
    #[error("Invalid URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Configuration errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// A transfer task panicked or was torn down before returning
    #[error("Transfer task for '{file_name}' failed: {reason}")]
    TaskFailed {
        file_name: String,
        reason: String,
    },
}

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Delete,
    Rename,
    Metadata,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Delete => write!(f, "deleting"),
            FileOperation::Rename => write!(f, "renaming"),
            FileOperation::Metadata => write!(f, "reading metadata of"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl DownloadError {
    /// Build a [`DownloadError::FileSystem`] for `path`
    pub fn file_system<P: Into<PathBuf>>(path: P, operation: FileOperation, source: std::io::Error) -> Self {
        DownloadError::FileSystem {
            path: path.into(),
            operation,
            source,
        }
    }

    /// Build a [`DownloadError::HttpRequest`] for `url`
    pub fn http<S: Into<String>>(url: S, source: reqwest::Error) -> Self {
        DownloadError::HttpRequest {
            url: url.into(),
            source,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            DownloadError::HttpRequest { .. } => "http_request",
            DownloadError::HttpStatus { .. } => "http_status",
            DownloadError::FileSystem { .. } => "file_system",
            DownloadError::InvalidManifest { .. } => "invalid_manifest",
            DownloadError::UrlResolution { .. } => "url_resolution",
            DownloadError::InvalidUrl { .. } => "invalid_url",
            DownloadError::Configuration { .. } => "configuration",
            DownloadError::TaskFailed { .. } => "task_failed",
        }
    }

    /// Create a detailed error report, including the chain of causes
    pub fn detailed_report(&self) -> String {
        let mut report = format!("Error: {}\n", self);
        report.push_str(&format!("Category: {}\n", self.category()));

        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            report.push_str(&format!("Caused by: {}\n", cause));
            source = std::error::Error::source(cause);
        }

        report
    }
}
