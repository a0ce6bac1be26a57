use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{AppConfig, BackendKind};
use crate::error::AppError;
use crate::identity::{DeviceFile, FirebaseAnonymousAuth, FirebaseAuthConfig, GuestIdentity, IdentityProvider};
use crate::services::{Session, SessionBootstrap, SharedSession};
use crate::store::{FirestoreConfig, MemoryDocumentStore, SqliteDocumentStore, StoreBackend};

#[derive(Clone)]
pub struct AppState {
    pub session: SharedSession,
    pub identity: Arc<dyn IdentityProvider>,
    pub backend: StoreBackend,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl AppState {
    pub fn new(identity: Arc<dyn IdentityProvider>, backend: StoreBackend) -> Self {
        Self {
            session: Session::shared(0),
            identity,
            backend,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let device = DeviceFile::new(config.guest_id_path.clone());

        let (identity, backend): (Arc<dyn IdentityProvider>, StoreBackend) = match config.backend {
            BackendKind::Memory => (
                Arc::new(GuestIdentity::new(device)),
                StoreBackend::Memory(Arc::new(MemoryDocumentStore::new())),
            ),
            BackendKind::Sqlite => (
                Arc::new(GuestIdentity::new(device)),
                StoreBackend::Sqlite(SqliteDocumentStore::connect(&config.database_url).await?),
            ),
            BackendKind::Firestore => (
                Arc::new(FirebaseAnonymousAuth::new(FirebaseAuthConfig::new_from_env()?, device)?),
                StoreBackend::Firestore(FirestoreConfig::new_from_env()?),
            ),
        };
        info!("Using {} document store", backend.name());

        let mut state = Self::new(identity, backend);
        state.retry_attempts = config.identity_retry_attempts;
        state.retry_delay = config.identity_retry_delay;
        Ok(state)
    }

    /// Spawns the bootstrap for the current session epoch.
    pub async fn start_session(&self) -> JoinHandle<()> {
        let epoch = self.session.lock().await.epoch();
        self.spawn_bootstrap(epoch)
    }

    /// Disposes the current session and bootstraps a new one. With `forget`
    /// the device identity is dropped too, so a new guest id is issued.
    pub async fn reset_session(&self, forget: bool) -> Result<JoinHandle<()>, AppError> {
        if forget {
            self.identity.forget().await?;
        }
        let epoch = self.session.lock().await.reset();
        info!("Session reset (epoch: {}, forget: {})", epoch, forget);
        Ok(self.spawn_bootstrap(epoch))
    }

    fn spawn_bootstrap(&self, epoch: u64) -> JoinHandle<()> {
        let bootstrap = SessionBootstrap::new(
            self.identity.clone(),
            self.backend.clone(),
            self.session.clone(),
            epoch,
            self.retry_attempts,
            self.retry_delay,
        );
        tokio::spawn(bootstrap.run())
    }
}
