use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::models::{FieldUpdate, UserDocument, UserId};
use crate::store::DocumentStore;

/// In-process document store. Documents are kept as JSON so reads go through the
/// same decoding path as remote backends.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<HashMap<String, Value>>,
    reads: AtomicUsize,
    creates: AtomicUsize,
    replaces: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw document, e.g. one written by an older client.
    pub fn insert_raw(&self, user: &UserId, document: Value) -> Result<(), AppError> {
        self.lock()?.insert(user.document_key(), document);
        Ok(())
    }

    pub fn raw_document(&self, user: &UserId) -> Result<Option<Value>, AppError> {
        Ok(self.lock()?.get(&user.document_key()).cloned())
    }

    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn replace_calls(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>, AppError> {
        self.documents.lock().map_err(|_| AppError::InternalServerError)
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::StoreWrite("memory store rejected write".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn load_document(&self, user: &UserId) -> Result<Option<UserDocument>, AppError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::StoreRead("memory store rejected read".to_string()));
        }

        match self.lock()?.get(&user.document_key()) {
            Some(raw) => Ok(Some(serde_json::from_value(raw.clone())?)),
            None => Ok(None),
        }
    }

    async fn create_document(&self, user: &UserId, document: &UserDocument) -> Result<(), AppError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let raw = serde_json::to_value(document)?;
        self.lock()?.insert(user.document_key(), raw);
        Ok(())
    }

    async fn replace_field(&self, user: &UserId, update: &FieldUpdate) -> Result<(), AppError> {
        self.replaces.fetch_add(1, Ordering::SeqCst);
        self.check_writable()?;

        let value = update.to_json()?;
        let mut documents = self.lock()?;
        let document = documents
            .get_mut(&user.document_key())
            .and_then(Value::as_object_mut)
            .ok_or(AppError::NotFound)?;
        document.insert(update.field().to_string(), value);
        Ok(())
    }
}
