use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::AppError;
use crate::identity::{Identity, IdentityProvider};
use crate::services::session::{SharedSession, reload};
use crate::store::StoreBackend;

/// Signs the device in and loads its todo list into the shared session.
pub struct SessionBootstrap {
    identity: Arc<dyn IdentityProvider>,
    backend: StoreBackend,
    session: SharedSession,
    epoch: u64,
    attempts: u32,
    delay: Duration,
}

impl SessionBootstrap {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        backend: StoreBackend,
        session: SharedSession,
        epoch: u64,
        attempts: u32,
        delay: Duration,
    ) -> Self {
        Self {
            identity,
            backend,
            session,
            epoch,
            attempts: attempts.max(1),
            delay,
        }
    }

    pub async fn run(self) {
        info!("Starting session bootstrap (epoch: {}, backend: {})", self.epoch, self.backend.name());

        let opened = match self.resolve_with_retry().await {
            Ok(identity) => self.backend.open(&identity).map(|store| (identity, store)),
            Err(e) => Err(e),
        };

        {
            let mut session = self.session.lock().await;
            if session.epoch() != self.epoch {
                info!("Session was reset during bootstrap, discarding epoch {}", self.epoch);
                return;
            }

            match opened {
                Ok((identity, store)) => {
                    info!("Session ready for {}", identity.user_id);
                    session.attach(identity, store);
                }
                Err(e) => {
                    warn!("Identity bootstrap failed: {}", e);
                    session.mark_unavailable();
                    return;
                }
            }
        }

        reload(&self.session).await;
    }

    async fn resolve_with_retry(&self) -> Result<Identity, AppError> {
        let mut attempt = 1;
        loop {
            match self.identity.resolve().await {
                Ok(identity) => return Ok(identity),
                Err(e) if attempt < self.attempts => {
                    warn!("Identity attempt {}/{} failed: {:?}", attempt, self.attempts, e);
                    attempt += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e @ AppError::IdentityUnavailable(_)) => return Err(e),
                Err(e) => return Err(AppError::IdentityUnavailable(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::models::UserId;
    use crate::services::session::{AuthState, Session};
    use crate::store::MemoryDocumentStore;

    struct FlakyIdentity {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl IdentityProvider for FlakyIdentity {
        async fn resolve(&self) -> Result<Identity, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(AppError::IdentityUnavailable("offline".to_string()));
            }
            Ok(Identity {
                user_id: UserId::new("flaky-guest"),
                id_token: None,
            })
        }

        async fn forget(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn bootstrap(identity: Arc<FlakyIdentity>, session: SharedSession, epoch: u64) -> SessionBootstrap {
        SessionBootstrap::new(
            identity,
            StoreBackend::Memory(Arc::new(MemoryDocumentStore::new())),
            session,
            epoch,
            3,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_retries_until_identity_resolves() {
        let identity = Arc::new(FlakyIdentity { failures: 2, calls: AtomicU32::new(0) });
        let session = Session::shared(0);

        bootstrap(identity.clone(), session.clone(), 0).run().await;

        let view = session.lock().await.view();
        assert_eq!(identity.calls.load(Ordering::SeqCst), 3);
        assert!(!view.loading);
        assert_eq!(view.user_id.as_deref(), Some("flaky-guest"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_session_loading() {
        let identity = Arc::new(FlakyIdentity { failures: 10, calls: AtomicU32::new(0) });
        let session = Session::shared(0);

        bootstrap(identity.clone(), session.clone(), 0).run().await;

        let view = session.lock().await.view();
        assert_eq!(identity.calls.load(Ordering::SeqCst), 3);
        assert!(view.loading);
        assert_eq!(view.auth, AuthState::Unavailable);
    }

    #[tokio::test]
    async fn test_stale_epoch_does_not_attach() {
        let identity = Arc::new(FlakyIdentity { failures: 0, calls: AtomicU32::new(0) });
        let session = Session::shared(0);
        session.lock().await.reset();

        bootstrap(identity, session.clone(), 0).run().await;

        let guard = session.lock().await;
        assert_eq!(guard.epoch(), 1);
        assert!(guard.user_id().is_none());
    }
}
