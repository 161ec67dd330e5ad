//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading
//! - Configuration validation
//! - Default value handling
//! - Secure API key storage via [`SecretString`]
//!
//! # Example
//!
//! ```
//! use anthropic_extract::config::{Config, SecretString};
//!
//! // Create a config directly (use Config::from_env() in production)
//! let config = Config {
//!     api_key: SecretString::new("sk-ant-example-key"),
//!     model_id: Some("anthropic-claude-3-5-sonnet-latest".to_string()),
//!     base_url: "https://api.anthropic.com/v1".to_string(),
//!     log_level: "info".to_string(),
//!     request_timeout_ms: 60_000,
//!     max_retries: 3,
//!     max_workers: 10,
//! };
//!
//! // API key is protected from accidental logging
//! let debug = format!("{:?}", config);
//! assert!(debug.contains("<REDACTED>"));
//! assert!(!debug.contains("sk-ant-example-key"));
//! ```

mod secret;
mod validation;

pub use secret::SecretString;
pub use validation::{
    validate_config, MAX_RETRIES, MAX_TIMEOUT_MS, MAX_WORKERS_LIMIT, MIN_TIMEOUT_MS,
};

use std::str::FromStr;

use crate::anthropic::{ClientConfig, DEFAULT_BASE_URL, DEFAULT_RETRY_DELAY_MS};
use crate::error::ConfigError;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default request timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

/// Default maximum retry attempts.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default number of requests in flight per batch.
pub const DEFAULT_MAX_WORKERS: usize = 10;

/// Runtime configuration.
///
/// Use [`Config::from_env`] to load configuration from environment variables.
/// The `api_key` field uses [`SecretString`] to prevent accidental logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Anthropic API key.
    pub api_key: SecretString,
    /// Model id, optionally carrying the `anthropic-` prefix.
    pub model_id: Option<String>,
    /// API base URL.
    pub base_url: String,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Maximum retry attempts.
    pub max_retries: u32,
    /// Requests in flight per batch.
    pub max_workers: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `ANTHROPIC_API_KEY`: Anthropic API key
    ///
    /// Optional environment variables (with defaults):
    /// - `ANTHROPIC_MODEL_ID`: Model id (default: unset, resolves to the default model)
    /// - `ANTHROPIC_BASE_URL`: API base URL (default: `https://api.anthropic.com/v1`)
    /// - `LOG_LEVEL`: Logging level (default: `info`)
    /// - `REQUEST_TIMEOUT_MS`: Request timeout (default: `60000`)
    /// - `MAX_RETRIES`: Maximum retry attempts (default: `3`)
    /// - `MAX_WORKERS`: Parallel requests per batch (default: `10`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `ANTHROPIC_API_KEY` is missing
    /// - A numeric variable is not a valid non-negative integer
    /// - Any value fails validation (see [`validate_config`])
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let api_key =
            std::env::var("ANTHROPIC_API_KEY").map_err(|_| ConfigError::MissingRequired {
                var: "ANTHROPIC_API_KEY".into(),
            })?;

        let model_id = std::env::var("ANTHROPIC_MODEL_ID")
            .ok()
            .filter(|id| !id.trim().is_empty());

        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into());

        let config = Self {
            api_key: SecretString::new(api_key),
            model_id,
            base_url,
            log_level,
            request_timeout_ms: parse_env_number("REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?,
            max_retries: parse_env_number("MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            max_workers: parse_env_number("MAX_WORKERS", DEFAULT_MAX_WORKERS)?,
        };

        validate_config(&config)?;
        Ok(config)
    }

    /// Transport settings for the HTTP client.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new()
            .with_base_url(&self.base_url)
            .with_timeout_ms(self.request_timeout_ms)
            .with_max_retries(self.max_retries)
            .with_retry_delay_ms(DEFAULT_RETRY_DELAY_MS)
    }
}

/// Parse an environment variable as a number, using a default if not set.
fn parse_env_number<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.trim().parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a non-negative integer".into(),
        })
    })
}
