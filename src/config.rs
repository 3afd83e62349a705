// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.

use crate::time_utils::DayPolicy;
use std::env;
use std::time::Duration;

const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Calendar day used for daily caps and streaks
    pub day_policy: DayPolicy,
    /// Upper bound on every ledger persistence call
    pub store_timeout: Duration,
    /// Keep gamification state in process memory instead of Firestore
    pub use_in_memory_store: bool,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            day_policy: DayPolicy::utc(),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            use_in_memory_store: true,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let offset_minutes: i32 = match env::var("XP_DAY_UTC_OFFSET_MINUTES") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("XP_DAY_UTC_OFFSET_MINUTES", raw))?,
            Err(_) => 0,
        };
        let day_policy = DayPolicy::from_offset_minutes(offset_minutes).ok_or_else(|| {
            ConfigError::Invalid("XP_DAY_UTC_OFFSET_MINUTES", offset_minutes.to_string())
        })?;

        let store_timeout_ms: u64 = match env::var("STORE_TIMEOUT_MS") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("STORE_TIMEOUT_MS", raw))?,
            Err(_) => DEFAULT_STORE_TIMEOUT_MS,
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            day_policy,
            store_timeout: Duration::from_millis(store_timeout_ms),
            use_in_memory_store: env::var("USE_IN_MEMORY_STORE").is_ok(),

            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
