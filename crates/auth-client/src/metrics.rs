//! Client metrics
//!
//! - `auth_client_requests_total` (counter): labels `method`, `status`
//! - `auth_client_refresh_total` (counter): label `outcome`
//! - `auth_client_refresh_queued_total` (counter): callers that joined an
//!   in-flight refresh instead of starting one
//!
//! These are no-ops until the application installs a recorder.

use crate::error::RefreshError;

/// Record a completed HTTP exchange (every attempt, including replays).
pub fn record_request(method: &str, status: u16) {
    metrics::counter!(
        "auth_client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a settled refresh cycle; `None` means it succeeded.
pub fn record_refresh(failure: Option<&RefreshError>) {
    metrics::counter!("auth_client_refresh_total", "outcome" => refresh_outcome_label(failure))
        .increment(1);
}

pub fn record_refresh_queued() {
    metrics::counter!("auth_client_refresh_queued_total").increment(1);
}

fn refresh_outcome_label(failure: Option<&RefreshError>) -> &'static str {
    match failure {
        None => "success",
        Some(RefreshError::NoRefreshCredential) => "no_refresh_credential",
        Some(RefreshError::RefreshRejected(_)) => "rejected",
        Some(RefreshError::RefreshUnreachable(_)) => "unreachable",
        Some(RefreshError::InvalidRefreshResponse(_)) => "invalid_response",
        Some(RefreshError::RefreshInterrupted) => "interrupted",
    }
}
