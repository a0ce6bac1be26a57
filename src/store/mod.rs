pub mod firestore;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;
use crate::identity::Identity;
use crate::models::{FieldUpdate, UserDocument, UserId};

pub use firestore::{FirestoreConfig, FirestoreStore};
pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

/// One document per user, addressed as `users/{uid}`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_document(&self, user: &UserId) -> Result<Option<UserDocument>, AppError>;
    async fn create_document(&self, user: &UserId, document: &UserDocument) -> Result<(), AppError>;
    /// Overwrites one top-level field. Fails when the document does not exist.
    async fn replace_field(&self, user: &UserId, update: &FieldUpdate) -> Result<(), AppError>;
}

/// Backend selected at startup; opened once per resolved identity.
#[derive(Clone)]
pub enum StoreBackend {
    Memory(Arc<MemoryDocumentStore>),
    Sqlite(SqliteDocumentStore),
    Firestore(FirestoreConfig),
}

impl StoreBackend {
    pub fn open(&self, identity: &Identity) -> Result<Arc<dyn DocumentStore>, AppError> {
        match self {
            StoreBackend::Memory(store) => Ok(store.clone()),
            StoreBackend::Sqlite(store) => Ok(Arc::new(store.clone())),
            StoreBackend::Firestore(config) => Ok(Arc::new(FirestoreStore::new(
                config.clone(),
                identity.id_token.clone(),
            )?)),
        }
    }

    pub async fn health(&self) -> Result<(), AppError> {
        match self {
            StoreBackend::Sqlite(store) => store.ping().await,
            StoreBackend::Memory(_) | StoreBackend::Firestore(_) => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Memory(_) => "memory",
            StoreBackend::Sqlite(_) => "sqlite",
            StoreBackend::Firestore(_) => "firestore",
        }
    }
}
