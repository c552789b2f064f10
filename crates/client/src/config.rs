//! Client configuration loaded from environment variables.
//!
//! [`LocalConfig`] covers what works offline (storage, cache window, error
//! tracking) and never fails for lack of backend settings. [`ClientConfig`]
//! adds the Firebase project.
//!
//! # Environment Variables
//!
//! ## Required (backend only)
//! - `FIREBASE_API_KEY` - Web API key of the Firebase project
//! - `FIREBASE_PROJECT_ID` - Firebase project id (Firestore database owner)
//!
//! ## Optional
//! - `GROCER_APP_ORIGIN` - Origin of the web app, used for email link redirects
//!   (default: `http://localhost:3000`)
//! - `GROCER_STORAGE_PATH` - Local storage file (default: `.grocer/storage.json`)
//! - `GROCER_CACHE_TTL_SECS` - Cache validity window in seconds (default: 300)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::services::ContinueUrls;

const DEFAULT_APP_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_STORAGE_PATH: &str = ".grocer/storage.json";
const DEFAULT_CACHE_TTL_SECS: &str = "300";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Firebase project settings
    pub firebase: FirebaseConfig,
    /// Origin of the web app; email links redirect back here
    pub app_origin: Url,
    /// Storage and error tracking
    pub local: LocalConfig,
}

/// Settings that need no backend.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Local storage file
    pub storage_path: PathBuf,
    /// Cache validity window
    pub cache_ttl: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Firebase project settings.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct FirebaseConfig {
    /// Web API key
    pub api_key: SecretString,
    /// Project id
    pub project_id: String,
}

impl std::fmt::Debug for FirebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseConfig")
            .field("api_key", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::with_local(LocalConfig::from_env()?)
    }

    /// Load the backend settings from environment variables and combine them
    /// with already loaded `local` settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn with_local(local: LocalConfig) -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let firebase = FirebaseConfig::from_env()?;
        let app_origin = Url::parse(&get_env_or_default("GROCER_APP_ORIGIN", DEFAULT_APP_ORIGIN))
            .map_err(|e| {
                ConfigError::InvalidEnvVar("GROCER_APP_ORIGIN".to_string(), e.to_string())
            })?;

        Ok(Self {
            firebase,
            app_origin,
            local,
        })
    }

    /// Redirect targets for emailed links.
    #[must_use]
    pub fn continue_urls(&self) -> ContinueUrls {
        ContinueUrls::from_origin(&self.app_origin)
    }
}

impl LocalConfig {
    /// Load the offline settings from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present. The
    /// Firebase variables are not read.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `GROCER_CACHE_TTL_SECS` is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let storage_path = PathBuf::from(get_env_or_default(
            "GROCER_STORAGE_PATH",
            DEFAULT_STORAGE_PATH,
        ));
        let cache_ttl = parse_ttl(&get_env_or_default(
            "GROCER_CACHE_TTL_SECS",
            DEFAULT_CACHE_TTL_SECS,
        ))?;

        Ok(Self {
            storage_path,
            cache_ttl,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }
}

impl FirebaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_required_secret("FIREBASE_API_KEY")?,
            project_id: get_required_env("FIREBASE_PROJECT_ID")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingEnvVar(key.to_string())),
    }
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_ttl(value: &str) -> Result<Duration, ConfigError> {
    let secs = value.trim().parse::<u64>().map_err(|e| {
        ConfigError::InvalidEnvVar("GROCER_CACHE_TTL_SECS".to_string(), e.to_string())
    })?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            "GROCER_CACHE_TTL_SECS".to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}
