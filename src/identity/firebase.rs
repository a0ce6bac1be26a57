use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::non_empty;
use crate::error::AppError;
use crate::identity::{DeviceFile, DeviceRecord, Identity, IdentityProvider};
use crate::models::UserId;

pub const DEFAULT_IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

#[derive(Clone, Debug)]
pub struct FirebaseAuthConfig {
    pub api_key: String,
    pub identity_toolkit_url: String,
    pub secure_token_url: String,
}

impl FirebaseAuthConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = non_empty(lookup);
        let api_key = lookup("FIREBASE_API_KEY")
            .ok_or_else(|| AppError::Config("FIREBASE_API_KEY is not set".to_string()))?;
        let identity_toolkit_url = lookup("IDENTITY_TOOLKIT_URL")
            .unwrap_or_else(|| DEFAULT_IDENTITY_TOOLKIT_URL.to_string());
        let secure_token_url = lookup("SECURE_TOKEN_URL")
            .unwrap_or_else(|| DEFAULT_SECURE_TOKEN_URL.to_string());

        Ok(Self {
            api_key,
            identity_toolkit_url: identity_toolkit_url.trim_end_matches('/').to_string(),
            secure_token_url: secure_token_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id_token: String,
    refresh_token: String,
    local_id: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    user_id: String,
}

/// Anonymous Firebase Authentication. The refresh token is kept in the device
/// file so the same device keeps the same uid.
pub struct FirebaseAnonymousAuth {
    client: Client,
    config: FirebaseAuthConfig,
    device: DeviceFile,
}

impl FirebaseAnonymousAuth {
    pub fn new(config: FirebaseAuthConfig, device: DeviceFile) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config, device })
    }

    async fn sign_up(&self) -> Result<Identity, AppError> {
        let url = format!(
            "{}/accounts:signUp?key={}",
            self.config.identity_toolkit_url, self.config.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "returnSecureToken": true }))
            .send()
            .await
            .map_err(|e| AppError::IdentityUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::IdentityUnavailable(format!(
                "Anonymous sign-up failed {}: {}",
                status, body
            )));
        }

        let parsed: SignUpResponse = response
            .json()
            .await
            .map_err(|e| AppError::IdentityUnavailable(format!("Failed to parse sign-up response: {}", e)))?;

        self.device
            .save(&DeviceRecord {
                user_id: parsed.local_id.clone(),
                refresh_token: Some(parsed.refresh_token),
            })
            .await?;
        tracing::info!("Signed in anonymously as {}", parsed.local_id);

        Ok(Identity {
            user_id: UserId::new(parsed.local_id),
            id_token: Some(parsed.id_token),
        })
    }

    /// `Ok(None)` means the stored refresh token was rejected.
    async fn refresh(&self, refresh_token: &str) -> Result<Option<Identity>, AppError> {
        let url = format!("{}/token?key={}", self.config.secure_token_url, self.config.api_key);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
            }))
            .send()
            .await
            .map_err(|e| AppError::IdentityUnavailable(e.to_string()))?;

        if response.status().is_client_error() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Stored refresh token rejected: {}", body);
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::IdentityUnavailable(format!(
                "Token refresh failed {}: {}",
                status, body
            )));
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AppError::IdentityUnavailable(format!("Failed to parse token response: {}", e)))?;

        self.device
            .save(&DeviceRecord {
                user_id: parsed.user_id.clone(),
                refresh_token: Some(parsed.refresh_token),
            })
            .await?;

        Ok(Some(Identity {
            user_id: UserId::new(parsed.user_id),
            id_token: Some(parsed.id_token),
        }))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAnonymousAuth {
    async fn resolve(&self) -> Result<Identity, AppError> {
        if let Some(DeviceRecord { refresh_token: Some(token), .. }) = self.device.load().await? {
            if let Some(identity) = self.refresh(&token).await? {
                tracing::debug!("Restored anonymous session {}", identity.user_id);
                return Ok(identity);
            }
        }
        self.sign_up().await
    }

    async fn forget(&self) -> Result<(), AppError> {
        self.device.remove().await
    }
}
