//! In-process credential store
//!
//! Holds the credential pair behind a tokio Mutex. Nothing survives process
//! exit; useful for short-lived tools and tests.

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::gateway::{AccessCredential, BoxFuture, CredentialGateway, RefreshCredential};

#[derive(Default)]
struct Slots {
    access: Option<AccessCredential>,
    refresh: Option<RefreshCredential>,
}

/// Credential gateway backed by process memory.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slots: Mutex<Slots>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a credential pair.
    pub fn with_credentials(
        access: Option<AccessCredential>,
        refresh: Option<RefreshCredential>,
    ) -> Self {
        Self {
            slots: Mutex::new(Slots { access, refresh }),
        }
    }
}

impl CredentialGateway for MemoryCredentialStore {
    fn access_credential(&self) -> BoxFuture<'_, Result<Option<AccessCredential>>> {
        Box::pin(async move { Ok(self.slots.lock().await.access.clone()) })
    }

    fn refresh_credential(&self) -> BoxFuture<'_, Result<Option<RefreshCredential>>> {
        Box::pin(async move { Ok(self.slots.lock().await.refresh.clone()) })
    }

    fn set_credentials(
        &self,
        access: AccessCredential,
        refresh: Option<RefreshCredential>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut slots = self.slots.lock().await;
            slots.access = Some(access);
            if let Some(refresh) = refresh {
                slots.refresh = Some(refresh);
            }
            debug!("stored credentials in memory");
            Ok(())
        })
    }

    fn clear_credentials(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.slots.lock().await = Slots::default();
            debug!("cleared in-memory credentials");
            Ok(())
        })
    }
}
