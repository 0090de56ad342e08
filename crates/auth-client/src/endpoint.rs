//! Refresh endpoint: exchanges a refresh credential for a new access credential
//!
//! `RefreshEndpoint` is the seam the coordinator calls through.
//! `HttpRefreshEndpoint` is the production implementation: it POSTs
//! `{"refreshToken": "..."}` to `<base_url>/<refresh_path>` and expects
//! `{"data": {"accessToken": "...", "refreshToken": "..."}}` back, where the
//! new refresh token is optional.

use std::time::Duration;

use credentials::{AccessCredential, BoxFuture, RefreshCredential};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::RefreshError;
use crate::request::truncated_text;

/// Credentials minted by a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshedCredentials {
    pub access: AccessCredential,
    /// Rotated refresh credential; `None` keeps the current one
    pub refresh: Option<RefreshCredential>,
}

/// Remote operation that mints a new access credential.
///
/// Implementations report 401/403 as `RefreshRejected` and transport
/// failures (including timeouts) as `RefreshUnreachable`.
pub trait RefreshEndpoint: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh: &'a RefreshCredential,
    ) -> BoxFuture<'a, Result<RefreshedCredentials, RefreshError>>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequestBody<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponseBody {
    data: Option<RefreshResponseData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponseData {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

/// Refresh endpoint reached over HTTP.
///
/// Uses its own plain request (no bearer header, no 401 interception) so a
/// rejected refresh can never recurse into another refresh.
pub struct HttpRefreshEndpoint {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpRefreshEndpoint {
    pub fn new(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            url: config.refresh_url(),
            timeout: config.timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, refresh: &RefreshCredential) -> Result<RefreshedCredentials, RefreshError> {
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(&RefreshRequestBody {
                refresh_token: refresh.expose(),
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RefreshError::RefreshUnreachable(format!(
                        "refresh request timed out after {}ms",
                        self.timeout.as_millis()
                    ))
                } else {
                    RefreshError::RefreshUnreachable(format!("refresh request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| RefreshError::RefreshUnreachable(format!("reading refresh response: {e}")))?;

        if !status.is_success() {
            let text = truncated_text(&body);
            // 401/403 means the refresh credential is revoked or expired
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(RefreshError::RefreshRejected(format!(
                    "refresh endpoint returned {status}: {text}"
                )));
            }
            return Err(RefreshError::InvalidRefreshResponse(format!(
                "refresh endpoint returned {status}: {text}"
            )));
        }

        debug!(%status, "refresh endpoint responded");
        parse_refresh_body(&body)
    }
}

impl RefreshEndpoint for HttpRefreshEndpoint {
    fn refresh<'a>(
        &'a self,
        refresh: &'a RefreshCredential,
    ) -> BoxFuture<'a, Result<RefreshedCredentials, RefreshError>> {
        Box::pin(self.call(refresh))
    }
}

/// Extract the new credential pair from a 2xx refresh body.
fn parse_refresh_body(body: &[u8]) -> Result<RefreshedCredentials, RefreshError> {
    let parsed: RefreshResponseBody = serde_json::from_slice(body)
        .map_err(|e| RefreshError::InvalidRefreshResponse(format!("malformed body: {e}")))?;

    let data = parsed.data.ok_or_else(|| {
        RefreshError::InvalidRefreshResponse("no access token in response".into())
    })?;

    match data.access_token {
        Some(access) if !access.is_empty() => Ok(RefreshedCredentials {
            access: AccessCredential::new(access),
            refresh: data
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(RefreshCredential::new),
        }),
        _ => Err(RefreshError::InvalidRefreshResponse(
            "no access token in response".into(),
        )),
    }
}
