//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! `API_BASE_URL` overrides `client.base_url` so one config file can target
//! several environments.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use auth_client::{ClientConfig, DEFAULT_LOGIN_PATH, DEFAULT_REFRESH_PATH};
use reqwest::header::{HeaderName, HeaderValue};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub client: ClientSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// API endpoint settings
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

/// Where credentials live between runs
#[derive(Debug, Default, Deserialize)]
pub struct CredentialsSection {
    /// JSON credential file; when absent credentials only last for one run
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Header sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct HeaderInjection {
    pub name: String,
    pub value: String,
}

fn default_timeout() -> u64 {
    10
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(base_url) = std::env::var("API_BASE_URL") {
            config.client.base_url = base_url;
        }

        if !config.client.base_url.starts_with("http://")
            && !config.client.base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.client.base_url
            )));
        }

        if config.client.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }

        for header in &config.headers {
            HeaderName::from_str(&header.name)
                .map_err(|e| Error::Config(format!("invalid header name {}: {e}", header.name)))?;
            HeaderValue::from_str(&header.value).map_err(|e| {
                Error::Config(format!("invalid value for header {}: {e}", header.name))
            })?;
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("authclient.toml")
    }

    /// Library config for the request pipeline.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut client = ClientConfig::new(self.client.base_url.clone())
            .map_err(|e| Error::Config(e.to_string()))?
            .with_timeout(Duration::from_secs(self.client.timeout_secs))
            .with_refresh_path(self.client.refresh_path.clone());

        // Names and values were validated in load()
        for header in &self.headers {
            let name = HeaderName::from_str(&header.name)
                .map_err(|e| Error::Config(format!("invalid header name {}: {e}", header.name)))?;
            let value = HeaderValue::from_str(&header.value).map_err(|e| {
                Error::Config(format!("invalid value for header {}: {e}", header.name))
            })?;
            client.default_headers.insert(name, value);
        }

        Ok(client)
    }
}
