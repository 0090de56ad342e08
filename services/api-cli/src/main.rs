//! authclient
//!
//! Command-line front end for the authenticated API client:
//! 1. Loads TOML config (`--config` > `CONFIG_PATH` > `authclient.toml`)
//! 2. Opens the credential store named in config, or an in-memory one
//! 3. Runs one command through `AuthClient`, which refreshes on expiry
//! 4. Prints the response as JSON on stdout; logs go to stderr
//!
//! Exit codes: 0 success, 1 non-2xx response, 2 session expired, 64 usage.

mod cli;
mod config;
mod error;

use std::sync::Arc;

use anyhow::{Context, Result};
use auth_client::{ApiResponse, AuthClient};
use credentials::{CredentialGateway, FileCredentialStore, MemoryCredentialStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, USAGE};
use crate::config::Config;

/// What a command prints and whether it counts as success.
#[derive(Debug)]
struct Outcome {
    output: Value,
    success: bool,
}

impl Outcome {
    /// Response body with the HTTP status merged in.
    ///
    /// Object bodies gain a `status` field; anything else is wrapped.
    fn from_response(response: &ApiResponse) -> Self {
        let status = response.status().as_u16();
        let output = match response.json::<Value>() {
            Ok(Value::Object(mut map)) => {
                map.insert("status".into(), json!(status));
                Value::Object(map)
            }
            Ok(other) => json!({ "data": other, "status": status }),
            Err(_) => json!({ "body": response.text(), "status": status }),
        };
        Self {
            output,
            success: response.is_success(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support.
    // stdout carries command output, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match Cli::parse(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}\n\n{USAGE}");
            std::process::exit(64);
        }
    };

    let prometheus = if cli.metrics {
        Some(
            PrometheusBuilder::new()
                .install_recorder()
                .context("failed to install Prometheus recorder")?,
        )
    } else {
        None
    };

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        path = %config_path.display(),
        base_url = %config.client.base_url,
        timeout_secs = config.client.timeout_secs,
        headers = config.headers.len(),
        "configuration loaded"
    );

    let gateway = open_gateway(&config).await?;
    let client = AuthClient::new(config.client_config()?, gateway)
        .context("failed to build API client")?;

    let result = run(&client, &config, cli.command).await;

    if let Some(handle) = prometheus {
        eprintln!("{}", handle.render());
    }

    match result {
        Ok(outcome) => {
            println!("{}", outcome.output);
            if !outcome.success {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) if e.is_authentication_failure() => {
            error!(error = %e, "session is no longer valid");
            eprintln!("session expired, sign in again with `authclient login`");
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

/// Credential store named in config, or a store that lasts for this run only.
async fn open_gateway(config: &Config) -> Result<Arc<dyn CredentialGateway>> {
    match &config.credentials.path {
        Some(path) => {
            let store = FileCredentialStore::load(path.clone())
                .await
                .with_context(|| format!("failed to open credentials at {}", path.display()))?;
            info!(path = %store.path().display(), "using file credential store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("no credentials.path configured, credentials will not outlive this run");
            Ok(Arc::new(MemoryCredentialStore::new()))
        }
    }
}

async fn run(client: &AuthClient, config: &Config, command: Command) -> auth_client::Result<Outcome> {
    match command {
        Command::Login { email, password } => {
            let payload = json!({ "email": email, "password": password.expose() });
            let response = client.login(&config.client.login_path, payload).await?;
            // Never echo the token pair, only who signed in
            let body: Value = response.json()?;
            Ok(Outcome {
                output: json!({
                    "status": response.status().as_u16(),
                    "user": body["data"]["user"].clone(),
                }),
                success: true,
            })
        }
        Command::Logout => {
            client.logout().await?;
            Ok(Outcome {
                output: json!({ "signed_out": true }),
                success: true,
            })
        }
        Command::Get { path } => Ok(Outcome::from_response(&client.get(&path).await?)),
        Command::Post { path, body } => {
            Ok(Outcome::from_response(&client.post(&path, body).await?))
        }
    }
}
