//! Authenticated API client with single-flight credential refresh
//!
//! Wraps every outbound request with the stored bearer credential and
//! recovers from expiry without duplicating the refresh call. The
//! `credentials` crate supplies storage; this crate owns the request path.
//!
//! Request flow:
//! 1. `AuthClient::send` reads the access credential through the gateway
//! 2. The request goes out with `Authorization: Bearer <token>`
//! 3. A 401 hands control to `RefreshCoordinator`, which lets exactly one
//!    caller reach the `RefreshEndpoint` and queues everyone else
//! 4. The refreshed credential is persisted, then every queued request is
//!    replayed once with it
//! 5. Refresh failure clears the gateway and fails every queued request with
//!    the same `AuthenticationExpired` error

pub mod client;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod request;

#[cfg(test)]
mod testing;

pub use client::AuthClient;
pub use config::ClientConfig;
pub use constants::*;
pub use coordinator::{RefreshCoordinator, RefreshOutcome};
pub use endpoint::{HttpRefreshEndpoint, RefreshEndpoint, RefreshedCredentials};
pub use error::{Error, RefreshError, Result};
pub use request::{ApiRequest, ApiResponse};
