//! Credential types and the gateway abstraction over their storage
//!
//! The request pipeline never touches storage directly. It reads and writes
//! tokens through `CredentialGateway`, which hides whether tokens live in
//! memory, in a file, or in a platform keychain.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::secret::Secret;

/// Boxed future returned by gateway operations.
///
/// `Pin<Box<dyn Future>>` keeps the trait dyn-compatible (`Arc<dyn CredentialGateway>`).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Short-lived bearer token attached to every outbound request.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential(Secret<String>);

impl AccessCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Secret::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose()
    }

    /// `Authorization` header value for this token.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0.expose())
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AccessCredential").field(&self.0).finish()
    }
}

/// Longer-lived token used only to mint a new `AccessCredential`.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshCredential(Secret<String>);

impl RefreshCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Secret::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose()
    }
}

impl fmt::Debug for RefreshCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefreshCredential").field(&self.0).finish()
    }
}

/// Storage capability for the access/refresh credential pair.
///
/// Every operation is fallible (`Error::StorageUnavailable`). Implementations
/// must be safe to call concurrently from many in-flight requests.
pub trait CredentialGateway: Send + Sync {
    /// Current access credential, or `None` if nothing is stored.
    fn access_credential(&self) -> BoxFuture<'_, Result<Option<AccessCredential>>>;

    /// Current refresh credential, or `None` if nothing is stored.
    fn refresh_credential(&self) -> BoxFuture<'_, Result<Option<RefreshCredential>>>;

    /// Store a new access credential.
    ///
    /// When `refresh` is `None` the stored refresh credential is kept as-is.
    fn set_credentials(
        &self,
        access: AccessCredential,
        refresh: Option<RefreshCredential>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Forget both credentials.
    fn clear_credentials(&self) -> BoxFuture<'_, Result<()>>;
}
