//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Which document store backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            other => Err(anyhow::anyhow!(
                "Unknown STORE_BACKEND: {}. Supported backends: memory, postgres",
                other
            )),
        }
    }
}

/// How post-commit notifications are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    /// Spawn a task per batch; the caller never waits on email
    #[default]
    Background,
    /// Await delivery before returning; used by tests
    Inline,
}

impl FromStr for NotificationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "background" => Ok(NotificationMode::Background),
            "inline" => Ok(NotificationMode::Inline),
            other => Err(anyhow::anyhow!(
                "Unknown NOTIFICATION_MODE: {}. Supported modes: background, inline",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Document store backend
    pub store_backend: StoreBackend,

    /// Database connection URL, required for the postgres backend
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    /// Post-commit notification delivery
    pub notification_mode: NotificationMode,

    /// Attempts for the best-effort disband-after-decline cleanup
    pub cleanup_retries: u32,

    /// Upper bound on team name length
    pub team_name_max_length: usize,

    /// Runtime configuration
    pub log_format: String,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_max_connections: 10,
            notification_mode: NotificationMode::Background,
            cleanup_retries: 3,
            team_name_max_length: 100,
            log_format: "json".to_string(),
            rust_log: "enlist=info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let defaults = Self::default();

        let store_backend = match env::var("STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.store_backend,
        };

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(anyhow::anyhow!(
                "DATABASE_URL is required when STORE_BACKEND=postgres"
            ));
        }

        let notification_mode = match env::var("NOTIFICATION_MODE") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.notification_mode,
        };

        let config = Self {
            store_backend,
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
            notification_mode,
            cleanup_retries: parse_or("CLEANUP_RETRIES", defaults.cleanup_retries),
            team_name_max_length: parse_or("TEAM_NAME_MAX_LENGTH", defaults.team_name_max_length),
            log_format: env::var("LOG_FORMAT").unwrap_or(defaults.log_format),
            rust_log: env::var("RUST_LOG").unwrap_or(defaults.rust_log),
        };

        Ok(config)
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
