//! Single-flight credential refresh
//!
//! Many requests can hit a 401 at the same moment. The coordinator makes sure
//! only one of them reaches the refresh endpoint; everyone else waits for that
//! call and receives the identical outcome.
//!
//! State machine:
//! - `Idle` → `Refreshing`: first caller; a refresh cycle task is spawned
//! - `Refreshing` → `Refreshing`: later callers push a oneshot sender and wait
//! - `Refreshing` → `Idle`: cycle settles, the waiter list is taken in the same
//!   critical section and every sender gets a clone of the outcome
//!
//! The cycle runs on its own task so a caller whose future is dropped
//! mid-refresh cannot strand the others in `Refreshing`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use credentials::{AccessCredential, CredentialGateway};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, warn};

use crate::endpoint::RefreshEndpoint;
use crate::error::RefreshError;
use crate::metrics;

/// What every caller of one refresh cycle receives.
pub type RefreshOutcome = Result<AccessCredential, RefreshError>;

type Waiter = oneshot::Sender<RefreshOutcome>;

enum RefreshState {
    Idle,
    /// `waiters` includes the caller that started the cycle
    Refreshing { waiters: Vec<Waiter> },
}

/// Process-wide refresh coordinator.
///
/// Cheap to clone; clones share the same state, so every pipeline handle
/// built from one coordinator funnels into the same single-flight refresh.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<RefreshState>,
    gateway: Arc<dyn CredentialGateway>,
    endpoint: Arc<dyn RefreshEndpoint>,
    completed_cycles: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(gateway: Arc<dyn CredentialGateway>, endpoint: Arc<dyn RefreshEndpoint>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RefreshState::Idle),
                gateway,
                endpoint,
                completed_cycles: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain a freshly minted access credential.
    ///
    /// Starts a refresh cycle if none is running, otherwise joins the running
    /// one. Returns only after the cycle has settled and, on success, after
    /// the new credentials were handed to the gateway.
    pub async fn obtain_refreshed_credential(&self) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();

        // Check-and-enqueue under one lock acquisition
        let starts_cycle = {
            let mut state = self.inner.state.lock().await;
            match &mut *state {
                RefreshState::Refreshing { waiters } => {
                    waiters.push(tx);
                    debug!(pending = waiters.len(), "refresh in flight, caller queued");
                    metrics::record_refresh_queued();
                    false
                }
                RefreshState::Idle => {
                    *state = RefreshState::Refreshing { waiters: vec![tx] };
                    true
                }
            }
        };

        if starts_cycle {
            debug!("starting credential refresh cycle");
            tokio::spawn(self.inner.clone().run_cycle());
        }

        rx.await.unwrap_or(Err(RefreshError::RefreshInterrupted))
    }

    pub async fn is_refreshing(&self) -> bool {
        matches!(
            *self.inner.state.lock().await,
            RefreshState::Refreshing { .. }
        )
    }

    /// Callers waiting on the in-flight cycle, including the one that started
    /// it. Zero when idle.
    pub async fn pending_callers(&self) -> usize {
        match &*self.inner.state.lock().await {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Number of refresh cycles that have settled since construction.
    pub fn completed_cycles(&self) -> u64 {
        self.inner.completed_cycles.load(Ordering::Relaxed)
    }
}

impl Inner {
    async fn run_cycle(self: Arc<Self>) {
        let worker = tokio::spawn({
            let inner = self.clone();
            async move { inner.refresh_once().await }
        });

        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "refresh task aborted");
                Err(RefreshError::RefreshInterrupted)
            }
        };

        self.settle(outcome).await;
    }

    /// One refresh attempt: read the refresh credential, call the endpoint,
    /// persist. Never retried.
    async fn refresh_once(&self) -> RefreshOutcome {
        let current = match self.gateway.refresh_credential().await {
            Ok(Some(refresh)) => refresh,
            Ok(None) => {
                debug!("no refresh credential stored, skipping endpoint call");
                return Err(RefreshError::NoRefreshCredential);
            }
            Err(e) => {
                warn!(error = %e, "reading refresh credential failed, treating as absent");
                return Err(RefreshError::NoRefreshCredential);
            }
        };

        let refreshed = self.endpoint.refresh(&current).await?;
        let rotated = refreshed.refresh.is_some();

        // Persist before anyone is resolved; keep the old refresh credential
        // when the endpoint did not rotate it
        let refresh = refreshed.refresh.unwrap_or(current);
        if let Err(e) = self
            .gateway
            .set_credentials(refreshed.access.clone(), Some(refresh))
            .await
        {
            warn!(error = %e, "failed to persist refreshed credentials");
        }

        debug!(rotated, "refreshed credentials persisted");
        Ok(refreshed.access)
    }

    async fn settle(&self, outcome: RefreshOutcome) {
        metrics::record_refresh(outcome.as_ref().err());

        match &outcome {
            Ok(_) => info!("credential refresh succeeded"),
            Err(e) => {
                warn!(error = %e, "credential refresh failed, clearing credentials");
                if let Err(clear_err) = self.gateway.clear_credentials().await {
                    warn!(error = %clear_err, "failed to clear credentials after refresh failure");
                }
            }
        }

        let waiters = {
            let mut state = self.state.lock().await;
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { waiters } => waiters,
                RefreshState::Idle => Vec::new(),
            }
        };
        self.completed_cycles.fetch_add(1, Ordering::Relaxed);

        debug!(waiters = waiters.len(), "releasing refresh waiters");
        for waiter in waiters {
            // A waiter whose caller was dropped has nobody left to tell
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::RefreshedCredentials;
    use crate::testing::FlakyGateway;
    use credentials::{BoxFuture, MemoryCredentialStore, RefreshCredential};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Refresh endpoint double: counts calls, returns a scripted outcome, and
    /// blocks each call until the test releases a permit.
    struct FakeEndpoint {
        calls: AtomicUsize,
        gate: Semaphore,
        outcome: Result<RefreshedCredentials, RefreshError>,
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl FakeEndpoint {
        fn gated(outcome: Result<RefreshedCredentials, RefreshError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Semaphore::new(0),
                outcome,
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn open(outcome: Result<RefreshedCredentials, RefreshError>) -> Arc<Self> {
            let endpoint = Self::gated(outcome);
            endpoint.gate.add_permits(1000);
            endpoint
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl RefreshEndpoint for FakeEndpoint {
        fn refresh<'a>(
            &'a self,
            refresh: &'a RefreshCredential,
        ) -> BoxFuture<'a, Result<RefreshedCredentials, RefreshError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.seen.lock().unwrap().push(refresh.expose().to_string());
                let _permit = self.gate.acquire().await.unwrap();
                self.outcome.clone()
            })
        }
    }

    fn minted(access: &str, refresh: Option<&str>) -> Result<RefreshedCredentials, RefreshError> {
        Ok(RefreshedCredentials {
            access: AccessCredential::new(access),
            refresh: refresh.map(RefreshCredential::new),
        })
    }

    fn signed_in_store() -> Arc<MemoryCredentialStore> {
        Arc::new(MemoryCredentialStore::with_credentials(
            Some(AccessCredential::new("at_expired")),
            Some(RefreshCredential::new("rt_1")),
        ))
    }

    async fn wait_for_pending(coordinator: &RefreshCoordinator, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while coordinator.pending_callers().await < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("callers never queued");
    }

    #[tokio::test]
    async fn refresh_persists_before_resolving() {
        let store = signed_in_store();
        let endpoint = FakeEndpoint::open(minted("at_2", Some("rt_2")));
        let coordinator = RefreshCoordinator::new(store.clone(), endpoint.clone());

        let token = coordinator.obtain_refreshed_credential().await.unwrap();

        assert_eq!(token.expose(), "at_2");
        assert_eq!(
            store.access_credential().await.unwrap().unwrap().expose(),
            "at_2"
        );
        assert_eq!(
            store.refresh_credential().await.unwrap().unwrap().expose(),
            "rt_2"
        );
        assert_eq!(endpoint.seen.lock().unwrap().as_slice(), ["rt_1"]);
        assert!(!coordinator.is_refreshing().await);
        assert_eq!(coordinator.completed_cycles(), 1);
    }

    #[tokio::test]
    async fn endpoint_without_rotation_keeps_refresh_credential() {
        let store = signed_in_store();
        let endpoint = FakeEndpoint::open(minted("at_2", None));
        let coordinator = RefreshCoordinator::new(store.clone(), endpoint);

        coordinator.obtain_refreshed_credential().await.unwrap();

        assert_eq!(
            store.refresh_credential().await.unwrap().unwrap().expose(),
            "rt_1"
        );
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_endpoint_call() {
        const CALLERS: usize = 8;
        let store = signed_in_store();
        let endpoint = FakeEndpoint::gated(minted("at_2", Some("rt_2")));
        let coordinator = RefreshCoordinator::new(store, endpoint.clone());

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.obtain_refreshed_credential().await })
            })
            .collect();

        wait_for_pending(&coordinator, CALLERS).await;
        assert!(coordinator.is_refreshing().await);
        endpoint.gate.add_permits(1);

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose(), "at_2");
        }
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(coordinator.pending_callers().await, 0);
        assert_eq!(coordinator.completed_cycles(), 1);
    }

    #[tokio::test]
    async fn failure_is_delivered_to_every_caller_and_clears_credentials() {
        const CALLERS: usize = 5;
        let store = signed_in_store();
        let endpoint = FakeEndpoint::gated(Err(RefreshError::RefreshRejected(
            "refresh token expired".into(),
        )));
        let coordinator = RefreshCoordinator::new(store.clone(), endpoint.clone());

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.obtain_refreshed_credential().await })
            })
            .collect();

        wait_for_pending(&coordinator, CALLERS).await;
        endpoint.gate.add_permits(1);

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert_eq!(
                err,
                RefreshError::RefreshRejected("refresh token expired".into())
            );
        }
        assert_eq!(endpoint.calls(), 1);
        assert!(store.access_credential().await.unwrap().is_none());
        assert!(store.refresh_credential().await.unwrap().is_none());
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn missing_refresh_credential_skips_endpoint() {
        let store = Arc::new(MemoryCredentialStore::with_credentials(
            Some(AccessCredential::new("at_expired")),
            None,
        ));
        let endpoint = FakeEndpoint::open(minted("at_2", None));
        let coordinator = RefreshCoordinator::new(store.clone(), endpoint.clone());

        let err = coordinator.obtain_refreshed_credential().await.unwrap_err();

        assert_eq!(err, RefreshError::NoRefreshCredential);
        assert_eq!(endpoint.calls(), 0);
        assert!(store.access_credential().await.unwrap().is_none());
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_not_retried() {
        let store = signed_in_store();
        let endpoint = FakeEndpoint::open(Err(RefreshError::RefreshUnreachable(
            "connection refused".into(),
        )));
        let coordinator = RefreshCoordinator::new(store, endpoint.clone());

        let err = coordinator.obtain_refreshed_credential().await.unwrap_err();

        assert!(matches!(err, RefreshError::RefreshUnreachable(_)));
        assert_eq!(endpoint.calls(), 1);
    }

    #[tokio::test]
    async fn each_settled_cycle_allows_a_new_one() {
        let store = signed_in_store();
        let endpoint = FakeEndpoint::open(minted("at_2", None));
        let coordinator = RefreshCoordinator::new(store, endpoint.clone());

        coordinator.obtain_refreshed_credential().await.unwrap();
        coordinator.obtain_refreshed_credential().await.unwrap();

        assert_eq!(endpoint.calls(), 2);
        assert_eq!(coordinator.completed_cycles(), 2);
    }

    #[tokio::test]
    async fn dropped_trigger_does_not_strand_queued_callers() {
        let store = signed_in_store();
        let endpoint = FakeEndpoint::gated(minted("at_2", None));
        let coordinator = RefreshCoordinator::new(store, endpoint.clone());

        let trigger = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.obtain_refreshed_credential().await }
        });
        wait_for_pending(&coordinator, 1).await;

        let follower = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.obtain_refreshed_credential().await }
        });
        wait_for_pending(&coordinator, 2).await;

        trigger.abort();
        assert!(trigger.await.unwrap_err().is_cancelled());
        endpoint.gate.add_permits(1);

        let token = follower.await.unwrap().unwrap();
        assert_eq!(token.expose(), "at_2");
        assert_eq!(endpoint.calls(), 1);
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn waiters_are_released_only_after_persist() {
        let gateway = FlakyGateway::gated_writes("at_expired", "rt_1");
        let endpoint = FakeEndpoint::open(minted("at_2", Some("rt_2")));
        let coordinator = RefreshCoordinator::new(gateway.clone(), endpoint.clone());

        let mut caller = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.obtain_refreshed_credential().await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while gateway.writes_started() == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("refresh never reached persistence");
        assert_eq!(endpoint.calls(), 1);

        // Endpoint has answered but the write is parked: nobody may resolve yet
        assert!(
            tokio::time::timeout(Duration::from_millis(50), &mut caller)
                .await
                .is_err(),
            "caller resolved before the new credential was persisted"
        );
        assert!(coordinator.is_refreshing().await);
        assert_eq!(
            gateway.access_credential().await.unwrap().unwrap().expose(),
            "at_expired"
        );

        gateway.open_writes();

        let token = caller.await.unwrap().unwrap();
        assert_eq!(token.expose(), "at_2");
        assert_eq!(
            gateway.access_credential().await.unwrap().unwrap().expose(),
            "at_2"
        );
        assert!(!coordinator.is_refreshing().await);
    }

    #[tokio::test]
    async fn unreadable_refresh_credential_counts_as_absent() {
        let gateway = FlakyGateway::unavailable();
        let endpoint = FakeEndpoint::open(minted("at_2", None));
        let coordinator = RefreshCoordinator::new(gateway.clone(), endpoint.clone());

        let err = coordinator.obtain_refreshed_credential().await.unwrap_err();

        assert_eq!(err, RefreshError::NoRefreshCredential);
        assert_eq!(endpoint.calls(), 0);
        assert_eq!(gateway.clears(), 1);
        assert!(!coordinator.is_refreshing().await);
        assert_eq!(coordinator.completed_cycles(), 1);
    }

    #[tokio::test]
    async fn failed_persist_still_delivers_credential_to_every_waiter() {
        const CALLERS: usize = 3;
        let gateway = FlakyGateway::read_only("at_expired", "rt_1");
        let endpoint = FakeEndpoint::gated(minted("at_2", Some("rt_2")));
        let coordinator = RefreshCoordinator::new(gateway.clone(), endpoint.clone());

        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move { coordinator.obtain_refreshed_credential().await })
            })
            .collect();

        wait_for_pending(&coordinator, CALLERS).await;
        endpoint.gate.add_permits(1);

        for handle in handles {
            let token = handle.await.unwrap().unwrap();
            assert_eq!(token.expose(), "at_2");
        }
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(gateway.writes_started(), 1);
        assert_eq!(gateway.clears(), 0, "a successful refresh never clears");
    }
}
