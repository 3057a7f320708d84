//! Application settings and configuration
//!
//! This module provides configuration management for the application,
//! loading settings from environment variables with sensible defaults.
//! Settings are loaded once at startup and never change afterwards.

use anyhow::{Context, Result};
use base64::Engine;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;

use crate::schemas::gemini::DEFAULT_MODEL;
use crate::services::credential_pool::{CounterMode, PoolError, SelectionPolicy, DEFAULT_BATCH_SIZE};
use crate::services::identity::FIREBASE_JWKS_URL;

/// Origin of the hosted quiz front-end
pub const DEFAULT_CORS_ORIGIN: &str = "https://api-testengine.netlify.app";

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "stage")]
    Staging,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development, staging, or production", s),
        }
    }
}

/// Gemini provider and key pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiSettings {
    /// API keys in priority order
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,
    pub model: String,
    pub base_url: Option<String>,
    /// Overall HTTP client timeout per request
    pub timeout_seconds: u64,
    /// Optional bound on each dispatch attempt
    pub attempt_timeout_seconds: Option<u64>,
    pub strategy: SelectionPolicy,
    pub counter_mode: CounterMode,
    pub rotation_batch_size: u64,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            timeout_seconds: 120,
            attempt_timeout_seconds: None,
            strategy: SelectionPolicy::Rotating,
            counter_mode: CounterMode::Relaxed,
            rotation_batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Firebase token verification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FirebaseSettings {
    pub project_id: Option<String>,
    pub jwks_url: String,
    pub jwks_cache_secs: u64,
}

impl Default for FirebaseSettings {
    fn default() -> Self {
        Self {
            project_id: None,
            jwks_url: FIREBASE_JWKS_URL.to_string(),
            jwks_cache_secs: 3600,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Server settings
    pub host: String,
    pub port: u16,
    pub cors_allowed_origin: String,

    pub gemini: GeminiSettings,
    pub firebase: FirebaseSettings,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let lookup = |key: &str| env::var(key).ok();

        let project_id = match env::var("FIREBASE_PROJECT_ID").ok().filter(|s| !s.trim().is_empty()) {
            Some(id) => Some(id),
            None => match env::var("FIREBASE_JSON") {
                Ok(encoded) => Some(
                    project_id_from_service_account(&encoded)
                        .context("Invalid FIREBASE_JSON service account")?,
                ),
                Err(_) => None,
            },
        };

        let settings = Self {
            // App settings
            app_name: env_or_default("APP_NAME", "quiz-gateway"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: env_or_default("LOG_LEVEL", "info"),

            // Server settings
            host: env_or_default("HOST", "0.0.0.0"),
            port: env_or_default("PORT", "3000")
                .parse()
                .context("Invalid PORT value")?,
            cors_allowed_origin: env_or_default("CORS_ALLOWED_ORIGIN", DEFAULT_CORS_ORIGIN),

            gemini: GeminiSettings {
                api_keys: collect_api_keys(lookup),
                model: env_or_default("GEMINI_MODEL", DEFAULT_MODEL),
                base_url: env::var("GEMINI_BASE_URL").ok(),
                timeout_seconds: env_or_default("GEMINI_TIMEOUT_SECS", "120")
                    .parse()
                    .context("Invalid GEMINI_TIMEOUT_SECS value")?,
                attempt_timeout_seconds: env::var("GEMINI_ATTEMPT_TIMEOUT_SECS")
                    .ok()
                    .map(|v| v.parse())
                    .transpose()
                    .context("Invalid GEMINI_ATTEMPT_TIMEOUT_SECS value")?,
                strategy: env_or_default("GEMINI_KEY_STRATEGY", "rotating").parse()?,
                counter_mode: env_or_default("GEMINI_COUNTER_MODE", "relaxed").parse()?,
                rotation_batch_size: env_or_default(
                    "GEMINI_ROTATION_BATCH_SIZE",
                    &DEFAULT_BATCH_SIZE.to_string(),
                )
                .parse()
                .context("Invalid GEMINI_ROTATION_BATCH_SIZE value")?,
            },

            firebase: FirebaseSettings {
                project_id,
                jwks_url: env_or_default("FIREBASE_JWKS_URL", FIREBASE_JWKS_URL),
                jwks_cache_secs: env_or_default("FIREBASE_JWKS_CACHE_SECS", "3600")
                    .parse()
                    .unwrap_or(3600),
            },
        };

        // Validate settings
        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.gemini.api_keys.is_empty() {
            return Err(PoolError::Empty)
                .context("Set GEMINI_API_KEYS or GEMINI_API_KEY_1..GEMINI_API_KEY_N");
        }
        if self.gemini.rotation_batch_size == 0 {
            return Err(PoolError::InvalidBatchSize.into());
        }
        if self.gemini.attempt_timeout_seconds == Some(0) {
            anyhow::bail!("GEMINI_ATTEMPT_TIMEOUT_SECS must be > 0");
        }

        if self.firebase.project_id.is_none() {
            anyhow::bail!("Firebase project id missing. Set FIREBASE_PROJECT_ID or FIREBASE_JSON");
        }

        axum::http::HeaderValue::from_str(&self.cors_allowed_origin)
            .context("Invalid CORS_ALLOWED_ORIGIN value")?;

        Ok(())
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "quiz-gateway".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_allowed_origin: DEFAULT_CORS_ORIGIN.to_string(),
            gemini: GeminiSettings::default(),
            firebase: FirebaseSettings::default(),
        }
    }
}

/// Gather API keys in priority order
///
/// `GEMINI_API_KEYS` (comma separated) comes first, then the numbered
/// `GEMINI_API_KEY_1`, `GEMINI_API_KEY_2`, ... read until the first missing
/// number. A lone `GEMINI_API_KEY` is used only when nothing else is set.
/// Blank entries are skipped.
pub fn collect_api_keys(lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
    let mut keys: Vec<String> = lookup("GEMINI_API_KEYS")
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut n = 1;
    while let Some(key) = lookup(&format!("GEMINI_API_KEY_{}", n)) {
        let key = key.trim();
        if !key.is_empty() {
            keys.push(key.to_string());
        }
        n += 1;
    }

    if keys.is_empty() {
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            keys.push(key.trim().to_string());
        }
    }

    keys
}

/// Extract `project_id` from a base64-encoded service account JSON
pub fn project_id_from_service_account(encoded: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct ServiceAccount {
        project_id: String,
    }

    let json = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("FIREBASE_JSON is not valid base64")?;
    let account: ServiceAccount =
        serde_json::from_slice(&json).context("FIREBASE_JSON has no project_id")?;
    if account.project_id.is_empty() {
        anyhow::bail!("FIREBASE_JSON has an empty project_id");
    }
    Ok(account.project_id)
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
