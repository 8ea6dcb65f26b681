//! Configuration types for the downloader system

use std::time::Duration;

use crate::downloader::core::{DownloadError, Result};

/// Origin used when none is configured
pub const DEFAULT_API_BASE: &str = "https://www.nexusmods.com";

/// Endpoint that exchanges a game/file id pair for a direct download URL
pub const DEFAULT_GENERATE_URL_PATH: &str = "/Core/Libs/Common/Managers/Downloads?GenerateDownloadUrl";

/// Configuration for download operations
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Origin base URL, without a trailing slash
    pub api_base: String,
    /// Path (with query) of the URL-generation endpoint, appended to `api_base`
    pub generate_url_path: String,
    /// Size of the chunks the response body is written and hashed in
    pub chunk_size: usize,
    /// Transfers per artifact before a digest mismatch abandons it
    pub max_hash_attempts: u32,
    pub user_agent: String,
    /// `None` leaves the client default in place
    pub connect_timeout: Option<Duration>,
    /// Whole-request deadline, including the body; `None` means no deadline
    pub request_timeout: Option<Duration>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            generate_url_path: DEFAULT_GENERATE_URL_PATH.to_string(),
            chunk_size: 256 * 1024,
            max_hash_attempts: 2,
            user_agent: format!("modfetch/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout: None,
            request_timeout: None,
        }
    }
}

impl DownloadConfig {
    pub fn builder() -> DownloadConfigBuilder {
        DownloadConfigBuilder::default()
    }

    /// Full URL of the URL-generation endpoint
    pub fn generate_url_endpoint(&self) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), self.generate_url_path)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(DownloadError::Configuration {
                message: "chunk size must be greater than zero".to_string(),
                field: Some("chunk_size".to_string()),
            });
        }
        if self.max_hash_attempts == 0 {
            return Err(DownloadError::Configuration {
                message: "at least one hash attempt is required".to_string(),
                field: Some("max_hash_attempts".to_string()),
            });
        }
        let endpoint = self.generate_url_endpoint();
        url::Url::parse(&endpoint).map_err(|source| DownloadError::InvalidUrl {
            url: endpoint.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Fluent builder for [`DownloadConfig`]
#[derive(Debug, Clone, Default)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    pub fn api_base<S: Into<String>>(mut self, api_base: S) -> Self {
        self.config.api_base = api_base.into();
        self
    }

    pub fn generate_url_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.generate_url_path = path.into();
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    pub fn max_hash_attempts(mut self, attempts: u32) -> Self {
        self.config.max_hash_attempts = attempts;
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<DownloadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
