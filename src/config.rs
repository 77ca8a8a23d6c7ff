// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings,
//! so everything is read from the environment once at startup.

use std::env;
use std::str::FromStr;

use crate::services::strava::{DEFAULT_API_BASE_URL, DEFAULT_OAUTH_BASE_URL};
use crate::services::sync::{DEFAULT_BACKFILL_DAYS, DEFAULT_SCHEDULED_DAYS, DEFAULT_USER_DELAY};

/// Which store implementation backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Firestore,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StorageBackend::Firestore),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(ConfigError::Invalid("STORAGE_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Frontend URL the OAuth callback redirects back to
    pub frontend_url: String,
    /// Public base URL of this service; the OAuth redirect URI hangs off it
    pub api_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub storage_backend: StorageBackend,
    /// Base URL of the Strava OAuth endpoints (`/authorize`, `/token`)
    pub strava_oauth_url: String,
    /// Base URL of the Strava REST API
    pub strava_api_url: String,

    // --- Sync behavior ---
    /// Days of history fetched right after a user connects
    pub sync_days_back: i64,
    /// Days of history fetched by the periodic sync
    pub scheduled_sync_days_back: i64,
    pub auto_sync_enabled: bool,
    pub sync_interval_secs: u64,
    /// Pause between users in the periodic sync
    pub sync_user_delay_ms: u64,
    /// Timeout applied to every outbound HTTP call
    pub http_timeout_secs: u64,

    // --- Secrets ---
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Webhook verification token
    pub webhook_verify_token: String,
}

impl Config {
    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            strava_client_id: required("STRAVA_CLIENT_ID")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            api_url: env::var("API_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parsed("PORT", 8080)?,
            storage_backend: match env::var("STORAGE_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => StorageBackend::Firestore,
            },
            strava_oauth_url: env::var("STRAVA_OAUTH_URL")
                .unwrap_or_else(|_| DEFAULT_OAUTH_BASE_URL.to_string()),
            strava_api_url: env::var("STRAVA_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),

            sync_days_back: parsed("SYNC_DAYS_BACK", DEFAULT_BACKFILL_DAYS)?,
            scheduled_sync_days_back: parsed("SCHEDULED_SYNC_DAYS_BACK", DEFAULT_SCHEDULED_DAYS)?,
            auto_sync_enabled: parsed("AUTO_SYNC_ENABLED", true)?,
            sync_interval_secs: parsed("SYNC_INTERVAL_SECS", 86_400)?,
            sync_user_delay_ms: parsed("SYNC_USER_DELAY_MS", DEFAULT_USER_DELAY.as_millis() as u64)?,
            http_timeout_secs: parsed("HTTP_TIMEOUT_SECS", 30)?,

            strava_client_secret: required("STRAVA_CLIENT_SECRET")?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            webhook_verify_token: required("WEBHOOK_VERIFY_TOKEN")?,
        })
    }

    /// Config for tests: in-memory storage, no pauses, no background sync.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            api_url: "http://localhost:8080".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            storage_backend: StorageBackend::Memory,
            strava_oauth_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            strava_api_url: DEFAULT_API_BASE_URL.to_string(),
            sync_days_back: DEFAULT_BACKFILL_DAYS,
            scheduled_sync_days_back: DEFAULT_SCHEDULED_DAYS,
            auto_sync_enabled: false,
            sync_interval_secs: 86_400,
            sync_user_delay_ms: 0,
            http_timeout_secs: 5,
            strava_client_secret: "test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            webhook_verify_token: "test_verify_token".to_string(),
        }
    }

    /// Redirect URI registered with Strava for the OAuth callback.
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/strava/callback", self.api_url)
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
