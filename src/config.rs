use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Sqlite,
    Firestore,
}

impl FromStr for BackendKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            "firestore" => Ok(BackendKind::Firestore),
            other => Err(AppError::Config(format!("unknown TODO_BACKEND: {}", other))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub backend: BackendKind,
    pub database_url: String,
    pub guest_id_path: PathBuf,
    pub identity_retry_attempts: u32,
    pub identity_retry_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            backend: BackendKind::Memory,
            database_url: "sqlite://guest-todo.db?mode=rwc".to_string(),
            guest_id_path: PathBuf::from(".guest-todo/identity.json"),
            identity_retry_attempts: 3,
            identity_retry_delay: Duration::from_millis(500),
        }
    }
}

impl AppConfig {
    /// Reads the process environment; unset variables keep their defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = non_empty(lookup);
        let mut config = Self::default();

        if let Some(addr) = lookup("BIND_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|_| AppError::Config(format!("invalid BIND_ADDR: {}", addr)))?;
        }
        if let Some(backend) = lookup("TODO_BACKEND") {
            config.backend = backend.parse()?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(path) = lookup("GUEST_ID_PATH") {
            config.guest_id_path = PathBuf::from(path);
        }
        if let Some(attempts) = lookup("IDENTITY_RETRY_ATTEMPTS") {
            config.identity_retry_attempts = attempts
                .parse()
                .map_err(|_| AppError::Config(format!("invalid IDENTITY_RETRY_ATTEMPTS: {}", attempts)))?;
        }
        if let Some(delay) = lookup("IDENTITY_RETRY_DELAY_MS") {
            let millis: u64 = delay
                .parse()
                .map_err(|_| AppError::Config(format!("invalid IDENTITY_RETRY_DELAY_MS: {}", delay)))?;
            config.identity_retry_delay = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

/// Treats `KEY=` the same as an unset variable.
pub fn non_empty<F>(lookup: F) -> impl Fn(&str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    move |key| lookup(key).filter(|value| !value.trim().is_empty())
}
