//! Credential storage for the authenticated API client
//!
//! Defines the access/refresh credential pair, the `CredentialGateway`
//! capability the request pipeline consumes, and two stores:
//! - `MemoryCredentialStore`: process memory only
//! - `FileCredentialStore`: JSON file, atomic writes, 0600 permissions
//!
//! Tokens are wrapped in `Secret` so they print as `[REDACTED]`.

pub mod error;
pub mod file;
pub mod gateway;
pub mod memory;
pub mod secret;

pub use error::{Error, Result};
pub use file::FileCredentialStore;
pub use gateway::{AccessCredential, BoxFuture, CredentialGateway, RefreshCredential};
pub use memory::MemoryCredentialStore;
pub use secret::Secret;
