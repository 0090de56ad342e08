//! Client configuration

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::constants::{DEFAULT_REFRESH_PATH, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};

/// Settings shared by the request pipeline and the HTTP refresh endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:1001/api/`
    pub base_url: String,
    /// Refresh endpoint path relative to `base_url`
    pub refresh_path: String,
    /// Applied to every API call and to the refresh call
    pub timeout: Duration,
    /// Sent with every request; per-call headers override these
    pub default_headers: HeaderMap,
}

impl ClientConfig {
    /// Config for `base_url` with JSON content type and default timeout.
    ///
    /// Rejects base URLs without an http(s) scheme.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got: {base_url}"
            )));
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            base_url,
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
            default_headers,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    /// Absolute URL for a path relative to `base_url`.
    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    pub fn refresh_url(&self) -> String {
        self.url_for(&self.refresh_path)
    }
}

/// Join base and path with exactly one `/` between them.
fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path)
}
