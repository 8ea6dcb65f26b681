//! Authenticated session handling
//!
//! The interactive login lives outside this crate; it leaves a cookie file
//! behind. Being logged in means that file exists.

pub mod cookies;

pub use cookies::SessionCookies;

use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::downloader::config::DownloadConfig;
use crate::downloader::core::files::remove_if_exists;
use crate::downloader::core::{DownloadError, Result};

/// Whether a login has left a cookie file at `path`
pub fn is_authenticated(path: &Path) -> bool {
    path.is_file()
}

/// Forget the session by deleting the cookie file
///
/// Returns whether there was a session to forget.
pub async fn logout(path: &Path) -> Result<bool> {
    if remove_if_exists(path).await? {
        info!("User logged out.");
        Ok(true)
    } else {
        warn!("User not logged in.");
        Ok(false)
    }
}

/// Build the single client shared by URL resolution and transfers
pub fn build_client(config: &DownloadConfig, cookies: Arc<SessionCookies>) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .cookie_provider(cookies);
    if let Some(timeout) = config.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| DownloadError::Configuration {
        message: format!("failed to create HTTP client: {}", e),
        field: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_login_state_follows_cookie_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        assert!(!is_authenticated(&path));
        assert!(!logout(&path).await.unwrap());

        tokio::fs::write(&path, r#"{"sid": "abc123"}"#).await.unwrap();
        assert!(is_authenticated(&path));

        assert!(logout(&path).await.unwrap());
        assert!(!is_authenticated(&path));
    }

    #[tokio::test]
    async fn test_client_sends_session_cookies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/protected"))
            .and(header("cookie", "sid=abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let cookies = Arc::new(SessionCookies::parse(r#"{"sid": "abc123"}"#).unwrap());
        let client = build_client(&DownloadConfig::default(), cookies).unwrap();

        let response = client.get(format!("{}/protected", server.uri())).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_expired_cdn_cookie_does_not_clobber_session() {
        let cdn = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.7z"))
            .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "sid=; Max-Age=0; Path=/"))
            .mount(&cdn)
            .await;
        let origin = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/protected"))
            .and(header("cookie", "sid=abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&origin)
            .await;

        let cookies = Arc::new(SessionCookies::parse(r#"{"sid": "abc123"}"#).unwrap());
        let client = build_client(&DownloadConfig::default(), cookies.clone()).unwrap();

        client.get(format!("{}/file.7z", cdn.uri())).send().await.unwrap();
        let response = client.get(format!("{}/protected", origin.uri())).send().await.unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(cookies.get("sid").as_deref(), Some("abc123"));
    }
}
