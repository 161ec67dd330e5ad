//! Error types for the Anthropic extraction backend.
//!
//! This module defines a layered error system:
//! - [`ProviderError`]: Top-level error for construction paths
//! - [`AnthropicError`]: Anthropic API and transport failures
//! - [`ConfigError`]: Fatal configuration errors, raised before any request
//! - [`InferenceError`]: Per-prompt failures surfaced in a result slot
//!
//! All errors implement `Send + Sync` for async compatibility.

use thiserror::Error;

/// Top-level error.
///
/// Returned when building a backend. Per-prompt failures never surface here;
/// they stay in their result slot as [`InferenceError`].
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Anthropic API error.
    #[error("Anthropic API error: {0}")]
    Anthropic(#[from] AnthropicError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Anthropic API errors.
///
/// These errors represent failures when communicating with the Anthropic API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnthropicError {
    /// Authentication failed due to invalid API key.
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Request was rate limited.
    #[error("Rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },

    /// The requested model is overloaded.
    #[error("Model overloaded: {model}")]
    ModelOverloaded {
        /// The model that is overloaded.
        model: String,
    },

    /// Request timed out.
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Request rejected locally before sending.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of what's invalid.
        message: String,
    },

    /// Error object returned by the API.
    #[error("API error {status} ({error_type}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error type reported by the API (e.g. `invalid_request_error`).
        error_type: String,
        /// Error message reported by the API.
        message: String,
    },

    /// Network communication error.
    #[error("Network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// Unexpected response from the API.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse {
        /// HTTP status, when the response had one.
        status: Option<u16>,
        /// Description of what was unexpected.
        message: String,
    },
}

impl AnthropicError {
    /// Returns true if this error is retryable.
    ///
    /// Rate limiting, overload, timeout and network errors are retryable, as
    /// is any response with status 408, 409 or 5xx. Authentication, invalid
    /// request and other 4xx errors are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::ModelOverloaded { .. }
            | Self::Timeout { .. }
            | Self::Network { .. } => true,
            Self::Api { status, .. }
            | Self::UnexpectedResponse {
                status: Some(status),
                ..
            } => is_retryable_status(*status),
            _ => false,
        }
    }
}

/// Statuses worth another attempt: request timeout, conflict, server errors.
const fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 409 | 500..=599)
}

/// Configuration errors.
///
/// Raised at construction or at the start of an inference call, always
/// before any request is sent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No API key was supplied.
    #[error("API key not provided")]
    MissingApiKey,

    /// A recognized parameter that this backend deliberately does not support.
    #[error("Unsupported parameter provided: {name}")]
    UnsupportedParameter {
        /// The rejected parameter name.
        name: String,
    },

    /// Required configuration is missing.
    #[error("Missing required: {var}")]
    MissingRequired {
        /// The missing variable name.
        var: String,
    },

    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable or parameter name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// Per-prompt inference error.
///
/// Carries the underlying [`AnthropicError`] so callers can inspect the cause.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InferenceError {
    /// The request for this prompt failed.
    #[error("Anthropic API error: {source}")]
    Runtime {
        /// The failure reported by the client.
        #[source]
        source: AnthropicError,
    },
}

impl InferenceError {
    /// The underlying client error.
    #[must_use]
    pub const fn original(&self) -> &AnthropicError {
        match self {
            Self::Runtime { source } => source,
        }
    }
}

impl From<AnthropicError> for InferenceError {
    fn from(source: AnthropicError) -> Self {
        Self::Runtime { source }
    }
}
