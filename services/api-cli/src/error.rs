//! CLI error types

use thiserror::Error;

/// Startup errors: bad arguments or bad configuration.
///
/// Request-time failures stay `auth_client::Error` so the caller can tell an
/// expired session from an ordinary failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using CLI Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = Error::Config("missing field".into());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = Error::Usage("unknown command: fetch".into());
        assert_eq!(err.to_string(), "Usage error: unknown command: fetch");

        let io_err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        assert!(io_err.to_string().starts_with("I/O error:"), "got: {io_err}");
    }
}
