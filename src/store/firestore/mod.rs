pub mod dto;

use std::env;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::config::non_empty;
use crate::error::AppError;
use crate::models::{FieldUpdate, UserDocument, UserId};
use crate::store::DocumentStore;

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl FirestoreConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = non_empty(lookup);
        let project_id = lookup("FIREBASE_PROJECT_ID")
            .ok_or_else(|| AppError::Config("FIREBASE_PROJECT_ID is not set".to_string()))?;
        let api_key = lookup("FIREBASE_API_KEY");
        let base_url = lookup("FIRESTORE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            project_id,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// Cloud Firestore over its REST API. One instance per signed-in identity.
pub struct FirestoreStore {
    client: Client,
    config: FirestoreConfig,
    id_token: Option<String>,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig, id_token: Option<String>) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config, id_token })
    }

    fn collection_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents/users",
            self.config.base_url, self.config.project_id
        )
    }

    fn url(&self, path: String, params: &[(&str, &str)]) -> String {
        let mut query: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        if let Some(key) = &self.config.api_key {
            query.push(format!("key={}", key));
        }
        if query.is_empty() {
            path
        } else {
            format!("{}?{}", path, query.join("&"))
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.id_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn error_message(response: Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<dto::ErrorResponse>(&body) {
            Ok(parsed) => format!(
                "Firestore error {} {}: {}",
                parsed.error.code, parsed.error.status, parsed.error.message
            ),
            Err(_) => format!("Firestore error {}: {}", status, body),
        }
    }
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn load_document(&self, user: &UserId) -> Result<Option<UserDocument>, AppError> {
        let url = self.url(format!("{}/{}", self.collection_url(), user), &[]);

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| AppError::StoreRead(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::StoreRead(Self::error_message(response).await));
        }

        let document: dto::Document = response
            .json()
            .await
            .map_err(|e| AppError::StoreRead(format!("Failed to parse Firestore document: {}", e)))?;

        Ok(Some(dto::decode_document(&document)))
    }

    async fn create_document(&self, user: &UserId, document: &UserDocument) -> Result<(), AppError> {
        let url = self.url(self.collection_url(), &[("documentId", user.as_str())]);
        let request_body = dto::encode_document(document);

        let response = self
            .authorize(self.client.post(&url))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AppError::StoreWrite(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::StoreWrite(Self::error_message(response).await));
        }

        tracing::debug!("Created Firestore document {}", user.document_key());
        Ok(())
    }

    async fn replace_field(&self, user: &UserId, update: &FieldUpdate) -> Result<(), AppError> {
        let field = update.field();
        let url = self.url(
            format!("{}/{}", self.collection_url(), user),
            &[
                ("updateMask.fieldPaths", field),
                ("currentDocument.exists", "true"),
            ],
        );

        let value = match update {
            FieldUpdate::Todolist(list) => dto::encode_todolist(list),
        };
        let mut request_body = dto::Document::default();
        request_body.fields.insert(field.to_string(), value);

        let response = self
            .authorize(self.client.patch(&url))
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AppError::StoreWrite(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound);
        }
        if !response.status().is_success() {
            return Err(AppError::StoreWrite(Self::error_message(response).await));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(api_key: Option<&str>) -> FirestoreStore {
        FirestoreStore::new(
            FirestoreConfig {
                project_id: "demo-todo".to_string(),
                api_key: api_key.map(str::to_string),
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            None,
        )
        .expect("Failed to build store")
    }

    #[test]
    fn test_document_url_carries_api_key() {
        let store = store(Some("abc"));
        let url = store.url(format!("{}/{}", store.collection_url(), "u1"), &[]);
        assert_eq!(
            url,
            "https://firestore.googleapis.com/v1/projects/demo-todo/databases/(default)/documents/users/u1?key=abc"
        );
    }

    #[test]
    fn test_update_url_masks_single_field() {
        let store = store(None);
        let url = store.url(
            format!("{}/{}", store.collection_url(), "u1"),
            &[("updateMask.fieldPaths", "todolist"), ("currentDocument.exists", "true")],
        );
        assert!(url.ends_with("/users/u1?updateMask.fieldPaths=todolist&currentDocument.exists=true"));
    }

    #[test]
    fn test_blank_project_id_is_a_config_error() {
        let result = FirestoreConfig::from_lookup(|key| match key {
            "FIREBASE_PROJECT_ID" => Some(String::new()),
            "FIREBASE_API_KEY" => Some(String::new()),
            _ => None,
        });
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_blank_api_key_is_left_off_urls() {
        let config = FirestoreConfig::from_lookup(|key| match key {
            "FIREBASE_PROJECT_ID" => Some("demo-todo".to_string()),
            "FIREBASE_API_KEY" => Some(String::new()),
            _ => None,
        })
        .unwrap();

        assert!(config.api_key.is_none());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
