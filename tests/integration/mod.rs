//! Integration tests for the Anthropic backend.
//!
//! These tests drive [`AnthropicLanguageModel`] through the real HTTP client
//! against a `wiremock` server.
//!
//! [`AnthropicLanguageModel`]: anthropic_extract::AnthropicLanguageModel

mod batch_inference;
mod error_recovery;
mod structured_output;

use anthropic_extract::anthropic::ClientConfig;
use anthropic_extract::provider::AnthropicLanguageModelBuilder;
use anthropic_extract::AnthropicLanguageModel;
use serde_json::{json, Value};
use wiremock::MockServer;

/// Builder pointed at `server`, with fast retries.
pub fn builder_for(server: &MockServer) -> AnthropicLanguageModelBuilder {
    AnthropicLanguageModel::builder()
        .api_key("test-api-key")
        .client_config(
            ClientConfig::default()
                .with_base_url(server.uri())
                .with_timeout_ms(5_000)
                .with_max_retries(0)
                .with_retry_delay_ms(1),
        )
}

/// Successful Messages API response body.
pub fn message_body(text: &str) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "content": [{"type": "text", "text": text}],
        "model": "claude-3-5-sonnet-latest",
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 12, "output_tokens": 7}
    })
}

/// Messages API error body.
pub fn error_body(error_type: &str, message: &str) -> Value {
    json!({
        "type": "error",
        "error": {"type": error_type, "message": message}
    })
}

/// Prompts as owned strings.
pub fn prompts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Request bodies received by `server`, in arrival order.
pub async fn received_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| serde_json::from_slice(&request.body).ok())
        .collect()
}
