//! Error types for credential storage

/// Errors from credential gateway operations.
///
/// Callers in the request path treat every variant as "credential absent";
/// the distinction only matters for logging.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("credential storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
