pub mod firebase;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::UserId;

pub use firebase::{FirebaseAnonymousAuth, FirebaseAuthConfig};

#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: UserId,
    /// Bearer credential for backends that check it.
    pub id_token: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Same id on every call from the same device, until `forget`.
    async fn resolve(&self) -> Result<Identity, AppError>;
    async fn forget(&self) -> Result<(), AppError>;
}

/// What a device remembers between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeviceFile {
    path: PathBuf,
}

impl DeviceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<Option<DeviceRecord>, AppError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable device file {}: {}", self.path.display(), e);
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, record: &DeviceRecord) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(record)?).await?;
        Ok(())
    }

    pub async fn remove(&self) -> Result<(), AppError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Local guest id: a UUID generated once and kept in the device file.
pub struct GuestIdentity {
    device: DeviceFile,
}

impl GuestIdentity {
    pub fn new(device: DeviceFile) -> Self {
        Self { device }
    }
}

#[async_trait]
impl IdentityProvider for GuestIdentity {
    async fn resolve(&self) -> Result<Identity, AppError> {
        if let Some(record) = self.device.load().await? {
            tracing::debug!("Reusing guest id {}", record.user_id);
            return Ok(Identity {
                user_id: UserId::new(record.user_id),
                id_token: None,
            });
        }

        let user_id = Uuid::new_v4().simple().to_string();
        self.device
            .save(&DeviceRecord {
                user_id: user_id.clone(),
                refresh_token: None,
            })
            .await?;
        tracing::info!("Issued new guest id {}", user_id);

        Ok(Identity {
            user_id: UserId::new(user_id),
            id_token: None,
        })
    }

    async fn forget(&self) -> Result<(), AppError> {
        self.device.remove().await
    }
}
