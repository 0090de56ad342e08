//! Gateway double for exercising storage failures

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use credentials::{
    AccessCredential, BoxFuture, CredentialGateway, MemoryCredentialStore, RefreshCredential,
};
use tokio::sync::Semaphore;

/// Memory store that can refuse reads, refuse writes, or hold writes on a
/// gate until the test opens it.
pub(crate) struct FlakyGateway {
    inner: MemoryCredentialStore,
    fail_reads: bool,
    fail_writes: bool,
    write_gate: Option<Semaphore>,
    writes_started: AtomicUsize,
    clears: AtomicUsize,
}

impl FlakyGateway {
    fn build(
        access: Option<&str>,
        refresh: Option<&str>,
        fail_reads: bool,
        fail_writes: bool,
        write_gate: Option<Semaphore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCredentialStore::with_credentials(
                access.map(AccessCredential::new),
                refresh.map(RefreshCredential::new),
            ),
            fail_reads,
            fail_writes,
            write_gate,
            writes_started: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
        })
    }

    /// Every operation fails with `StorageUnavailable`.
    pub(crate) fn unavailable() -> Arc<Self> {
        Self::build(Some("at_hidden"), Some("rt_hidden"), true, true, None)
    }

    /// Reads succeed; `set_credentials` and `clear_credentials` fail.
    pub(crate) fn read_only(access: &str, refresh: &str) -> Arc<Self> {
        Self::build(Some(access), Some(refresh), false, true, None)
    }

    /// `set_credentials` parks until `open_writes` is called.
    pub(crate) fn gated_writes(access: &str, refresh: &str) -> Arc<Self> {
        Self::build(Some(access), Some(refresh), false, false, Some(Semaphore::new(0)))
    }

    pub(crate) fn open_writes(&self) {
        if let Some(gate) = &self.write_gate {
            gate.add_permits(1000);
        }
    }

    /// `set_credentials` calls entered so far, including parked ones.
    pub(crate) fn writes_started(&self) -> usize {
        self.writes_started.load(Ordering::SeqCst)
    }

    pub(crate) fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

fn unavailable() -> credentials::Error {
    credentials::Error::StorageUnavailable("keychain locked".into())
}

impl CredentialGateway for FlakyGateway {
    fn access_credential(&self) -> BoxFuture<'_, credentials::Result<Option<AccessCredential>>> {
        Box::pin(async move {
            if self.fail_reads {
                return Err(unavailable());
            }
            self.inner.access_credential().await
        })
    }

    fn refresh_credential(&self) -> BoxFuture<'_, credentials::Result<Option<RefreshCredential>>> {
        Box::pin(async move {
            if self.fail_reads {
                return Err(unavailable());
            }
            self.inner.refresh_credential().await
        })
    }

    fn set_credentials(
        &self,
        access: AccessCredential,
        refresh: Option<RefreshCredential>,
    ) -> BoxFuture<'_, credentials::Result<()>> {
        Box::pin(async move {
            self.writes_started.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.write_gate {
                let _permit = gate.acquire().await.map_err(|_| unavailable())?;
            }
            if self.fail_writes {
                return Err(unavailable());
            }
            self.inner.set_credentials(access, refresh).await
        })
    }

    fn clear_credentials(&self) -> BoxFuture<'_, credentials::Result<()>> {
        Box::pin(async move {
            self.clears.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(unavailable());
            }
            self.inner.clear_credentials().await
        })
    }
}
