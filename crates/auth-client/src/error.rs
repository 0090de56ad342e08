//! Error types for the authenticated request pipeline

use std::time::Duration;

/// Why a credential refresh failed.
///
/// `Clone` because one refresh outcome is delivered to every caller that
/// queued behind it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// Nothing to refresh with; the endpoint was not called.
    #[error("no refresh credential on record")]
    NoRefreshCredential,

    /// The endpoint invalidated the refresh credential (401/403).
    #[error("refresh credential rejected: {0}")]
    RefreshRejected(String),

    /// Transport failure or timeout reaching the endpoint.
    #[error("refresh endpoint unreachable: {0}")]
    RefreshUnreachable(String),

    /// The endpoint answered but not with a usable access credential.
    #[error("invalid refresh response: {0}")]
    InvalidRefreshResponse(String),

    /// The refresh task stopped before settling.
    #[error("refresh interrupted before completion")]
    RefreshInterrupted,
}

/// Errors surfaced by `AuthClient`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Refresh failed; both credentials have been cleared.
    #[error("authentication expired: {0}")]
    AuthenticationExpired(#[source] RefreshError),

    /// The request was replayed with a freshly refreshed credential and the
    /// server still answered 401.
    #[error("request unauthorized after credential refresh: {body}")]
    AuthenticationRejected { body: String },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Non-success status, produced only by `ApiResponse::error_for_status`.
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Rejected client settings, e.g. a base URL without a scheme.
    #[error("invalid client configuration: {0}")]
    Config(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response decode failed: {0}")]
    Decode(String),

    #[error("credential store error: {0}")]
    Credentials(#[from] credentials::Error),
}

impl Error {
    /// Whether the caller has to re-authenticate (as opposed to an ordinary
    /// request failure).
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationExpired(_) | Error::AuthenticationRejected { .. }
        )
    }

    pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Error::Timeout(timeout)
        } else {
            Error::Http(err.to_string())
        }
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;
