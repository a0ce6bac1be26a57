use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::AppError;
use crate::models::{FieldUpdate, StoreTimestamp, UserDocument, UserId};
use crate::store::DocumentStore;

/// Documents kept as JSON rows in a local SQLite database.
#[derive(Clone, Debug)]
pub struct SqliteDocumentStore {
    db: SqlitePool,
}

impl SqliteDocumentStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str) -> Result<Self, AppError> {
        // every in-memory connection is its own database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self::new(pool))
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("select 1").execute(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn load_document(&self, user: &UserId) -> Result<Option<UserDocument>, AppError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM documents WHERE key = ?")
            .bind(user.document_key())
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::StoreRead(e.to_string()))?;

        match row {
            Some((body,)) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn create_document(&self, user: &UserId, document: &UserDocument) -> Result<(), AppError> {
        let body = serde_json::to_string(document)?;
        let expire_at = document
            .expire_at
            .and_then(StoreTimestamp::to_datetime)
            .map(|ts| ts.to_rfc3339());
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO documents (key, body, expire_at, created_at) VALUES (?, ?, ?, ?)"
        )
        .bind(user.document_key())
        .bind(body)
        .bind(expire_at)
        .bind(now)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::StoreWrite(e.to_string()))?;

        Ok(())
    }

    async fn replace_field(&self, user: &UserId, update: &FieldUpdate) -> Result<(), AppError> {
        let path = format!("$.{}", update.field());
        let value = serde_json::to_string(&update.to_json()?)?;

        let result = sqlx::query(
            "UPDATE documents SET body = json_set(body, ?, json(?)) WHERE key = ?"
        )
        .bind(path)
        .bind(value)
        .bind(user.document_key())
        .execute(&self.db)
        .await
        .map_err(|e| AppError::StoreWrite(e.to_string()))?
        .rows_affected();

        if result == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}
