//! Direct download URL resolution against the Nexus Mods website
//!
//! The website hands out short-lived CDN links for a `(game_id, file_id)` pair
//! to a logged-in session. The exchange is a form POST that answers with
//! `{"url": "..."}`, followed by a HEAD request to make sure the link is live.
//! Both requests go through the same cookie-carrying client as the transfers.

use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::{DownloadError, Result};
use crate::downloader::manifest::ManifestEntry;

/// Body of the URL-generation response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratedDownloadUrl {
    #[serde(default)]
    pub url: String,
}

/// Resolves manifest entries to direct download URLs
#[derive(Debug, Clone)]
pub struct NexusApi {
    client: Client,
    config: Arc<DownloadConfig>,
}

impl NexusApi {
    pub fn new(client: Client, config: Arc<DownloadConfig>) -> Self {
        Self { client, config }
    }

    /// Obtain a live direct URL for `entry`
    ///
    /// Any failure (transport error, non-success status, empty URL or a dead
    /// link) is reported as [`DownloadError::UrlResolution`] naming the entry.
    pub async fn resolve_download_url(&self, entry: &ManifestEntry) -> Result<String> {
        match self.generate_and_check(entry).await {
            Ok(url) => {
                debug!("Direct download link for {} obtained", entry.file_name);
                Ok(url)
            }
            Err(reason) => {
                error!(
                    file_name = %entry.file_name,
                    game_id = entry.game_id,
                    file_id = entry.file_id,
                    "Error while getting direct download link: {}",
                    reason
                );
                Err(DownloadError::UrlResolution {
                    file_name: entry.file_name.clone(),
                    reason,
                })
            }
        }
    }

    async fn generate_and_check(&self, entry: &ManifestEntry) -> std::result::Result<String, String> {
        let endpoint = self.config.generate_url_endpoint();
        let form = [
            ("fid", entry.file_id.to_string()),
            ("game_id", entry.game_id.to_string()),
        ];

        let response = self
            .client
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", endpoint, e))?;

        if !response.status().is_success() {
            return Err(format!("{} returned status {}", endpoint, response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("reading response from {} failed: {}", endpoint, e))?;
        let generated: GeneratedDownloadUrl = serde_json::from_str(&body)
            .map_err(|e| format!("unexpected response from {}: {}", endpoint, e))?;

        let url = generated.url.trim().to_string();
        if url.is_empty() {
            return Err("response did not contain a download URL".to_string());
        }
        url::Url::parse(&url).map_err(|e| format!("response contained an invalid URL '{}': {}", url, e))?;

        let head = self
            .client
            .head(&url)
            .send()
            .await
            .map_err(|e| format!("HEAD {} failed: {}", url, e))?;
        if !head.status().is_success() {
            return Err(format!("HEAD {} returned status {}", url, head.status().as_u16()));
        }

        Ok(url)
    }
}
