// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Sync is optional: without `GCP_PROJECT_ID` there is no remote store and
//! without `GOOGLE_CLIENT_ID` sign-in is disabled. The app then runs
//! local-only.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,
    /// Directory holding the on-device store and remote snapshot caches
    pub data_dir: PathBuf,
    /// Directory holding the app shell
    pub assets_dir: PathBuf,
    /// Asset cache version label
    pub cache_version: String,
    /// Origin the app shell is served from (for CORS and sign-in)
    pub frontend_url: String,
    /// GCP project ID; enables the remote store
    pub gcp_project_id: Option<String>,
    /// Google OAuth client ID; enables sign-in
    pub google_client_id: Option<String>,
    /// Copy local entries into an empty remote collection without asking
    pub auto_migrate: bool,
    /// How often an open subscription re-reads the remote collection
    pub sync_poll_interval: Duration,
    /// How long to wait for the first remote snapshot after sign-in
    pub migration_settle: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: parse_var("PORT", 8080)?,
            data_dir: env::var("DATA_DIR")
                .unwrap_or_else(|_| "./data".to_string())
                .into(),
            assets_dir: env::var("ASSETS_DIR")
                .unwrap_or_else(|_| "./web".to_string())
                .into(),
            cache_version: env::var("CACHE_VERSION")
                .unwrap_or_else(|_| "workout-tracker-v1".to_string()),
            frontend_url: env::var("FRONTEND_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            gcp_project_id: optional_var("GCP_PROJECT_ID"),
            google_client_id: optional_var("GOOGLE_CLIENT_ID"),
            auto_migrate: parse_var("AUTO_MIGRATE", true)?,
            sync_poll_interval: Duration::from_secs(parse_var("SYNC_POLL_SECS", 30)?.max(1)),
            migration_settle: Duration::from_millis(parse_var("MIGRATION_SETTLE_MS", 500)?),
        })
    }

    /// Config for tests: local-only, data under `data_dir`.
    pub fn test_default() -> Self {
        Self {
            port: 8080,
            data_dir: "./test-data".into(),
            assets_dir: "./web".into(),
            cache_version: "workout-tracker-test".to_string(),
            frontend_url: "http://localhost:8080".to_string(),
            gcp_project_id: None,
            google_client_id: None,
            auto_migrate: true,
            sync_poll_interval: Duration::from_secs(30),
            migration_settle: Duration::from_millis(500),
        }
    }

    /// Whether both halves of sync are configured.
    pub fn sync_configured(&self) -> bool {
        self.gcp_project_id.is_some() && self.google_client_id.is_some()
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional_var(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name, raw)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {0}: {1:?}")]
    Invalid(&'static str, String),
}
