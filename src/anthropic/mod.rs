//! Anthropic Messages API client.
//!
//! This module provides:
//! - [`AnthropicClient`], a `reqwest` client for `POST /v1/messages`
//! - Retry with exponential backoff for retryable failures
//! - Request and response types for the subset of the API this crate uses
//!
//! # Example
//!
//! ```no_run
//! use anthropic_extract::anthropic::{AnthropicClient, ClientConfig, MessagesRequest};
//!
//! # async fn run() -> Result<(), anthropic_extract::error::AnthropicError> {
//! let client = AnthropicClient::new("sk-ant-xxx", ClientConfig::default())?;
//! let request = MessagesRequest::single_prompt("claude-3-5-sonnet-latest", 256, "Hello");
//! let response = client.send(&request).await?;
//! println!("{}", response.text().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod types;

pub(crate) use client::elapsed_ms;
pub use client::AnthropicClient;
pub use config::{
    ClientConfig, ANTHROPIC_VERSION, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL, DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_MS, STRUCTURED_OUTPUTS_BETA,
};
pub use types::{
    ApiErrorBody, ApiErrorDetails, ApiMessage, ApiUsage, ContentBlock, MessagesRequest,
    MessagesResponse, OutputFormat,
};
