//! Cookie set captured by the login flow, served to every request
//!
//! The login flow stores the browser's cookies as a flat JSON object,
//! `{"name": "value", ...}`. All of them are sent to every host: the website
//! that generates download links and the CDN those links point at. Cookies
//! that responses set are kept in a [`Jar`] and only go back to the hosts
//! that set them, until they expire.

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::downloader::core::{DownloadError, FileOperation, Result};

/// Session cookies shared by every request of a run
#[derive(Debug, Default)]
pub struct SessionCookies {
    login: Mutex<BTreeMap<String, String>>,
    scoped: Jar,
}

impl SessionCookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(cookies: BTreeMap<String, String>) -> Self {
        Self {
            login: Mutex::new(cookies),
            scoped: Jar::default(),
        }
    }

    /// Read the cookie file written by the login flow
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DownloadError::file_system(path, FileOperation::Read, e))?;
        let cookies = Self::parse(&contents).map_err(|e| DownloadError::Configuration {
            message: format!("cookie file '{}' is not a JSON object of strings: {}", path.display(), e),
            field: Some("cookies".to_string()),
        })?;
        debug!("Loaded {} session cookies from {}", cookies.len(), path.display());
        Ok(cookies)
    }

    /// Parse a `{"name": "value"}` JSON object
    pub fn parse(contents: &str) -> serde_json::Result<Self> {
        let cookies: BTreeMap<String, String> = serde_json::from_str(contents)?;
        Ok(Self::from_map(cookies))
    }

    /// Add a login cookie, sent to every host
    pub fn insert<N: Into<String>, V: Into<String>>(&self, name: N, value: V) {
        if let Ok(mut cookies) = self.login.lock() {
            cookies.insert(name.into(), value.into());
        }
    }

    /// Value of a login cookie
    pub fn get(&self, name: &str) -> Option<String> {
        self.login.lock().ok().and_then(|cookies| cookies.get(name).cloned())
    }

    /// Number of login cookies
    pub fn len(&self) -> usize {
        self.login.lock().map(|cookies| cookies.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Join name/value pairs into a `Cookie` header
fn header_value(cookies: &BTreeMap<String, String>) -> Option<HeaderValue> {
    if cookies.is_empty() {
        return None;
    }
    let joined = cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ");
    match HeaderValue::from_str(&joined) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Session cookies cannot form a Cookie header: {}", e);
            None
        }
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &url::Url) {
        debug!("Storing cookies set by {}", url.host_str().unwrap_or_default());
        self.scoped.set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &url::Url) -> Option<HeaderValue> {
        let mut merged = self.login.lock().ok()?.clone();

        // A live cookie the host set itself wins over the login value
        if let Some(scoped) = self.scoped.cookies(url) {
            if let Ok(text) = scoped.to_str() {
                for pair in text.split("; ") {
                    if let Some((name, value)) = pair.split_once('=') {
                        merged.insert(name.to_string(), value.to_string());
                    }
                }
            }
        }
        header_value(&merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_header_contains_every_cookie() {
        let cookies = SessionCookies::parse(r#"{"sid": "abc123", "member_id": "42"}"#).unwrap();
        let url = url::Url::parse("https://cf-files.nexus-cdn.com/file.7z").unwrap();

        let header = cookies.cookies(&url).unwrap();
        assert_eq!(header.to_str().unwrap(), "member_id=42; sid=abc123");
    }

    #[test]
    fn test_empty_set_sends_no_header() {
        let url = url::Url::parse("https://www.nexusmods.com/").unwrap();
        assert!(SessionCookies::new().cookies(&url).is_none());
    }

    #[test]
    fn test_response_cookies_stay_with_their_host() {
        let cookies = SessionCookies::parse(r#"{"sid": "abc123"}"#).unwrap();
        let origin = url::Url::parse("https://www.nexusmods.com/").unwrap();
        let cdn = url::Url::parse("https://cf-files.nexus-cdn.com/file.7z").unwrap();
        let headers = [
            HeaderValue::from_static("cf_clearance=xyz; Path=/; HttpOnly"),
            HeaderValue::from_static("sid=rotated; Path=/; Secure"),
        ];

        cookies.set_cookies(&mut headers.iter(), &origin);

        let to_origin = cookies.cookies(&origin).unwrap();
        assert_eq!(to_origin.to_str().unwrap(), "cf_clearance=xyz; sid=rotated");
        let to_cdn = cookies.cookies(&cdn).unwrap();
        assert_eq!(to_cdn.to_str().unwrap(), "sid=abc123");
        assert_eq!(cookies.get("sid").as_deref(), Some("abc123"));
        assert_eq!(cookies.len(), 1);
    }

    #[test]
    fn test_expired_cookie_from_cdn_keeps_login_session() {
        let cookies = SessionCookies::parse(r#"{"sid": "abc123"}"#).unwrap();
        let origin = url::Url::parse("https://www.nexusmods.com/").unwrap();
        let cdn = url::Url::parse("https://cf-files.nexus-cdn.com/file.7z").unwrap();
        let headers = [HeaderValue::from_static("sid=; Max-Age=0; Path=/")];

        cookies.set_cookies(&mut headers.iter(), &cdn);

        assert_eq!(cookies.get("sid").as_deref(), Some("abc123"));
        assert_eq!(cookies.cookies(&origin).unwrap().to_str().unwrap(), "sid=abc123");
        assert_eq!(cookies.cookies(&cdn).unwrap().to_str().unwrap(), "sid=abc123");
    }

    #[tokio::test]
    async fn test_load_rejects_non_object() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        tokio::fs::write(&path, "[1, 2, 3]").await.unwrap();

        let err = SessionCookies::load(&path).await.unwrap_err();
        assert_eq!(err.category(), "configuration");
    }
}
