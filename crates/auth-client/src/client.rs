//! Authenticated request pipeline
//!
//! `AuthClient::send` is the only way application code talks to the API:
//! 1. Read the access credential from the gateway and attach it as a bearer
//!    header (no credential means the request goes out unauthenticated)
//! 2. Any response other than 401 is handed back untouched
//! 3. First 401: wait on the refresh coordinator, then replay the identical
//!    request once with the new credential
//! 4. 401 on the replay is terminal (`AuthenticationRejected`); a failed
//!    refresh is terminal (`AuthenticationExpired`) and leaves the gateway
//!    cleared
//!
//! Timeouts, connection errors and non-401 statuses are not this layer's
//! business and pass straight through.

use std::sync::Arc;

use credentials::{AccessCredential, CredentialGateway, RefreshCredential};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::coordinator::RefreshCoordinator;
use crate::endpoint::{HttpRefreshEndpoint, RefreshEndpoint};
use crate::error::{Error, Result};
use crate::metrics;
use crate::request::{ApiRequest, ApiResponse, truncated_text};

/// Body returned by the login endpoint.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    data: Option<LoginData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginData {
    token: Option<String>,
    refresh_token: Option<String>,
}

/// HTTP client that injects bearer credentials and recovers from expiry.
///
/// Clones share the HTTP connection pool, the gateway and the refresh
/// coordinator.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    gateway: Arc<dyn CredentialGateway>,
    coordinator: RefreshCoordinator,
}

impl AuthClient {
    /// Client refreshing through `<base_url>/<refresh_path>` over HTTP.
    pub fn new(config: ClientConfig, gateway: Arc<dyn CredentialGateway>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(format!("building HTTP client: {e}")))?;
        let endpoint = Arc::new(HttpRefreshEndpoint::new(http.clone(), &config));
        Ok(Self::with_endpoint(http, config, gateway, endpoint))
    }

    /// Client with a caller-supplied refresh endpoint.
    pub fn with_endpoint(
        http: reqwest::Client,
        config: ClientConfig,
        gateway: Arc<dyn CredentialGateway>,
        endpoint: Arc<dyn RefreshEndpoint>,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(gateway.clone(), endpoint);
        info!(base_url = %config.base_url, "auth client initialized");
        Self {
            http,
            config: Arc::new(config),
            gateway,
            coordinator,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn CredentialGateway> {
        &self.gateway
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send `request` with the stored bearer credential, refreshing once on 401.
    #[instrument(
        skip_all,
        fields(
            request_id = %format!("req_{}", uuid::Uuid::new_v4().as_simple()),
            method = %request.method(),
            path = %request.path(),
        )
    )]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let mut credential = self.current_access_credential().await;
        let mut replayed = false;

        loop {
            let response = self.dispatch(&request, credential.as_ref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if replayed {
                warn!("401 again after credential refresh, not refreshing twice");
                return Err(Error::AuthenticationRejected {
                    body: truncated_text(response.bytes()),
                });
            }

            debug!(
                had_credential = credential.is_some(),
                "401 received, waiting for refreshed credential"
            );
            match self.coordinator.obtain_refreshed_credential().await {
                Ok(fresh) => {
                    credential = Some(fresh);
                    replayed = true;
                }
                Err(e) => {
                    warn!(error = %e, "credential refresh failed");
                    return Err(Error::AuthenticationExpired(e));
                }
            }
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse> {
        self.send(ApiRequest::post(path, body)).await
    }

    /// Exchange login details for a credential pair and store it.
    ///
    /// Sent without a bearer header and outside the refresh path: a 401 here
    /// means bad login details, reported as `Error::Status`.
    pub async fn login(&self, path: &str, payload: serde_json::Value) -> Result<ApiResponse> {
        let request = ApiRequest::post(path, payload);
        let response = self.dispatch(&request, None).await?.error_for_status()?;

        let body: LoginResponse = response.json()?;
        let data = body
            .data
            .ok_or_else(|| Error::Decode("login response has no data".into()))?;
        let token = data
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Decode("login response has no token".into()))?;

        self.gateway
            .set_credentials(
                AccessCredential::new(token),
                data.refresh_token
                    .filter(|t| !t.is_empty())
                    .map(RefreshCredential::new),
            )
            .await?;
        info!("signed in, credentials stored");
        Ok(response)
    }

    /// Forget both credentials.
    pub async fn logout(&self) -> Result<()> {
        self.gateway.clear_credentials().await?;
        info!("signed out, credentials cleared");
        Ok(())
    }

    /// Stored access credential; storage failures count as "none".
    async fn current_access_credential(&self) -> Option<AccessCredential> {
        match self.gateway.access_credential().await {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, "reading access credential failed, sending unauthenticated");
                None
            }
        }
    }

    /// One HTTP exchange. Headers: client defaults, then per-call overrides,
    /// then the bearer credential.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        credential: Option<&AccessCredential>,
    ) -> Result<ApiResponse> {
        let url = self.config.url_for(request.path());

        let mut headers = self.config.default_headers.clone();
        for (name, value) in request.headers() {
            headers.insert(name.clone(), value.clone());
        }
        if let Some(credential) = credential {
            let mut value = HeaderValue::from_str(&credential.bearer()).map_err(|e| {
                Error::InvalidRequest(format!("access credential is not a valid header value: {e}"))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = self
            .http
            .request(request.method().clone(), &url)
            .headers(headers)
            .timeout(self.config.timeout);
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::from_transport(e, self.config.timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::from_transport(e, self.config.timeout))?;

        metrics::record_request(request.method().as_str(), status.as_u16());
        debug!(%status, bytes = body.len(), "response received");
        Ok(ApiResponse::new(status, headers, body))
    }
}
