//! Anthropic API client with retry logic.
//!
//! This module provides:
//! - HTTP client for the Anthropic Messages API
//! - Retry logic with exponential backoff
//! - Local request validation
//! - Status and error-body mapping onto [`AnthropicError`]

#![allow(clippy::missing_errors_doc)]

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};

use super::config::{ClientConfig, ANTHROPIC_VERSION, STRUCTURED_OUTPUTS_BETA};
use super::types::{ApiErrorBody, MessagesRequest, MessagesResponse};
use crate::config::SecretString;
use crate::error::AnthropicError;
use crate::traits::MessagesApi;

/// Default `retry-after` when a 429 carries no usable header.
const DEFAULT_RETRY_AFTER_SECONDS: u64 = 60;

/// Anthropic API client.
///
/// Holds one `reqwest::Client`, which pools connections and is shared by
/// every concurrent request.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: SecretString,
    config: ClientConfig,
}

impl AnthropicClient {
    /// Create a new Anthropic client.
    pub fn new(
        api_key: impl Into<SecretString>,
        config: ClientConfig,
    ) -> Result<Self, AnthropicError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AnthropicError::Network {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
        })
    }

    /// Create a client with default configuration.
    pub fn with_api_key(api_key: impl Into<SecretString>) -> Result<Self, AnthropicError> {
        Self::new(api_key, ClientConfig::default())
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Get the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request with retry logic.
    pub async fn send(&self, request: &MessagesRequest) -> Result<MessagesResponse, AnthropicError> {
        Self::validate_request(request)?;
        self.execute_with_retry(request).await
    }

    /// Reject requests with nothing to send. Size limits are left to the API.
    fn validate_request(request: &MessagesRequest) -> Result<(), AnthropicError> {
        if request.messages.is_empty() {
            return Err(AnthropicError::InvalidRequest {
                message: "Request has no messages".to_string(),
            });
        }

        for msg in &request.messages {
            if msg.content.trim().is_empty() {
                return Err(AnthropicError::InvalidRequest {
                    message: "Message content is empty".to_string(),
                });
            }
        }

        Ok(())
    }

    async fn execute_with_retry(
        &self,
        request: &MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_delay(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Retrying Anthropic request"
                );
                tokio::time::sleep(delay).await;
            }

            match self.execute_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, attempt, "Retryable error occurred");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AnthropicError::Network {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn execute_once(
        &self,
        request: &MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        let url = self.config.messages_url();
        let start = Instant::now();

        tracing::debug!(
            url = %url,
            model = %request.model,
            max_tokens = request.max_tokens,
            structured = request.output_format.is_some(),
            timeout_ms = self.config.timeout_ms,
            "Starting Anthropic API request"
        );

        let mut builder = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json");
        if request.output_format.is_some() {
            builder = builder.header("anthropic-beta", STRUCTURED_OUTPUTS_BETA);
        }

        let response = builder.json(request).send().await.map_err(|e| {
            let elapsed_ms = elapsed_ms(start);
            if e.is_timeout() {
                tracing::error!(
                    url = %url,
                    elapsed_ms,
                    timeout_ms = self.config.timeout_ms,
                    "Anthropic API request timed out"
                );
                AnthropicError::Timeout {
                    timeout_ms: self.config.timeout_ms,
                }
            } else {
                tracing::error!(url = %url, elapsed_ms, error = %e, "Anthropic API request failed");
                AnthropicError::Network {
                    message: e.to_string(),
                }
            }
        })?;

        tracing::debug!(
            url = %url,
            status = %response.status(),
            elapsed_ms = elapsed_ms(start),
            "Anthropic API response received"
        );

        let status = response.status();
        if !status.is_success() {
            return Err(Self::map_error_status(status, response, &request.model).await);
        }

        response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| AnthropicError::UnexpectedResponse {
                status: Some(status.as_u16()),
                message: format!("Failed to parse response: {e}"),
            })
    }

    async fn map_error_status(status: StatusCode, response: Response, model: &str) -> AnthropicError {
        match status.as_u16() {
            401 => AnthropicError::AuthenticationFailed,
            429 => {
                let retry_after_seconds = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS);
                AnthropicError::RateLimited {
                    retry_after_seconds,
                }
            }
            529 => AnthropicError::ModelOverloaded {
                model: model.to_string(),
            },
            code => {
                let body = response.text().await.unwrap_or_default();
                match serde_json::from_str::<ApiErrorBody>(&body) {
                    Ok(parsed) => AnthropicError::Api {
                        status: code,
                        error_type: parsed.error.error_type,
                        message: parsed.error.message,
                    },
                    Err(_) => AnthropicError::UnexpectedResponse {
                        status: Some(code),
                        message: format!("Status {status}: {body}"),
                    },
                }
            }
        }
    }
}

#[async_trait]
impl MessagesApi for AnthropicClient {
    async fn create_message(
        &self,
        request: MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        self.send(&request).await
    }
}

/// Milliseconds since `start`, saturating at `u64::MAX`.
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use crate::anthropic::{ApiMessage, OutputFormat};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_mock_client(server: &MockServer, max_retries: u32) -> AnthropicClient {
        let config = ClientConfig::default()
            .with_base_url(server.uri())
            .with_max_retries(max_retries)
            .with_retry_delay_ms(1)
            .with_timeout_ms(5_000);
        AnthropicClient::new("test-api-key", config).unwrap()
    }

    fn success_response_body(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_123",
            "content": [{"type": "text", "text": text}],
            "model": "claude-3-5-sonnet-latest",
            "usage": {"input_tokens": 10, "output_tokens": 20},
            "stop_reason": "end_turn"
        })
    }

    fn prompt_request(prompt: &str) -> MessagesRequest {
        MessagesRequest::single_prompt("claude-3-5-sonnet-latest", 1000, prompt)
    }

    #[test]
    fn test_client_new() {
        let client = AnthropicClient::with_api_key("test-key").unwrap();
        assert_eq!(client.base_url(), "https://api.anthropic.com/v1");
    }

    #[test]
    fn test_client_debug_hides_api_key() {
        let client = AnthropicClient::with_api_key("sk-ant-very-secret").unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-ant-very-secret"));
        assert!(debug.contains("<REDACTED>"));
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_prompt() {
        let server = MockServer::start().await;
        let client = create_mock_client(&server, 0);

        let err = client.send(&prompt_request("   ")).await.unwrap_err();
        assert!(matches!(err, AnthropicError::InvalidRequest { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_rejects_no_messages() {
        let server = MockServer::start().await;
        let client = create_mock_client(&server, 0);

        let request = MessagesRequest::new("claude-3", 10, Vec::new());
        let err = client.send(&request).await.unwrap_err();
        assert!(err.to_string().contains("no messages"));
    }

    #[tokio::test]
    async fn test_large_message_is_forwarded() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_response_body("read it")))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        let request = MessagesRequest::new(
            "claude-3",
            10,
            vec![ApiMessage::user("word ".repeat(50_000))],
        );
        let response = client.send(&request).await.unwrap();
        assert_eq!(response.text().as_deref(), Some("read it"));

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(
            body["messages"][0]["content"].as_str().map(str::len),
            Some(250_000)
        );
    }

    #[tokio::test]
    async fn test_send_success_with_headers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-3-5-sonnet-latest",
                "messages": [{"role": "user", "content": "Hi"}],
                "max_tokens": 1000
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_response_body("Hello!")))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        let response = client.send(&prompt_request("Hi")).await.unwrap();

        assert_eq!(response.text().as_deref(), Some("Hello!"));
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 20);
    }

    #[tokio::test]
    async fn test_structured_request_sends_beta_header() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("anthropic-beta", STRUCTURED_OUTPUTS_BETA))
            .and(body_partial_json(json!({
                "output_format": {"type": "json_schema", "schema": {"type": "object"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_response_body("{}")))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        let request = prompt_request("Extract")
            .with_output_format(OutputFormat::json_schema(json!({"type": "object"})));
        let response = client.send(&request).await.unwrap();
        assert_eq!(response.text().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_plain_request_has_no_beta_header() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_response_body("ok")))
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        client.send(&prompt_request("Hi")).await.unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(!received[0].headers.contains_key("anthropic-beta"));
    }

    #[tokio::test]
    async fn test_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        let err = client.send(&prompt_request("Hi")).await.unwrap_err();
        assert_eq!(err, AnthropicError::AuthenticationFailed);
    }

    #[tokio::test]
    async fn test_rate_limited_reads_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(429)
                    .append_header("retry-after", "30")
                    .set_body_string("Rate limited"),
            )
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        match client.send(&prompt_request("Hi")).await.unwrap_err() {
            AnthropicError::RateLimited {
                retry_after_seconds,
            } => assert_eq!(retry_after_seconds, 30),
            e => panic!("Wrong error type: {e:?}"),
        }
    }

    #[tokio::test]
    async fn test_model_overloaded() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(529))
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        let err = client.send(&prompt_request("Hi")).await.unwrap_err();
        assert_eq!(
            err,
            AnthropicError::ModelOverloaded {
                model: "claude-3-5-sonnet-latest".into()
            }
        );
    }

    #[tokio::test]
    async fn test_api_error_body_is_parsed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "type": "error",
                "error": {"type": "invalid_request_error", "message": "top_k: must be >= 0"}
            })))
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        let err = client.send(&prompt_request("Hi")).await.unwrap_err();
        assert_eq!(
            err,
            AnthropicError::Api {
                status: 400,
                error_type: "invalid_request_error".into(),
                message: "top_k: must be >= 0".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_non_json_error_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        let err = client.send(&prompt_request("Hi")).await.unwrap_err();
        assert!(matches!(
            err,
            AnthropicError::UnexpectedResponse {
                status: Some(502),
                ..
            }
        ));
        assert!(err.to_string().contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        let err = client.send(&prompt_request("Hi")).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse response"));
    }

    #[tokio::test]
    async fn test_retries_retryable_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(529))
            .expect(3)
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 2);
        let err = client.send(&prompt_request("Hi")).await.unwrap_err();
        assert!(matches!(err, AnthropicError::ModelOverloaded { .. }));
    }

    #[tokio::test]
    async fn test_recovers_after_service_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_response_body("back")))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 2);
        let response = client.send(&prompt_request("Hi")).await.unwrap();
        assert_eq!(response.text().as_deref(), Some("back"));
    }

    #[tokio::test]
    async fn test_retries_server_error_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "type": "error",
                "error": {"type": "api_error", "message": "Internal server error"}
            })))
            .expect(3)
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 2);
        let err = client.send(&prompt_request("Hi")).await.unwrap_err();
        assert!(matches!(err, AnthropicError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_does_not_retry_bad_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "type": "error",
                "error": {"type": "invalid_request_error", "message": "bad"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 3);
        let err = client.send(&prompt_request("Hi")).await.unwrap_err();
        assert!(matches!(err, AnthropicError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_does_not_retry_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 3);
        let err = client.send(&prompt_request("Hi")).await.unwrap_err();
        assert_eq!(err, AnthropicError::AuthenticationFailed);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(529))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_response_body("later")))
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 1);
        let response = client.send(&prompt_request("Hi")).await.unwrap();
        assert_eq!(response.text().as_deref(), Some("later"));
    }

    #[tokio::test]
    async fn test_trait_impl_delegates_to_send() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_response_body("via trait")))
            .mount(&server)
            .await;

        let client = create_mock_client(&server, 0);
        let response = MessagesApi::create_message(&client, prompt_request("Hi"))
            .await
            .unwrap();
        assert_eq!(response.text().as_deref(), Some("via trait"));
    }
}
