//! Error recovery and edge case tests.
//!
//! Tests how the backend isolates per-prompt failures and rejects bad options.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use anthropic_extract::anthropic::ClientConfig;
use anthropic_extract::{AnthropicError, ConfigError, Options, ProviderError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{builder_for, error_body, message_body, prompts};

#[tokio::test]
async fn test_one_failure_leaves_other_slots_intact() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(json!({
            "messages": [{"role": "user", "content": "bad"}]
        })))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(error_body("invalid_request_error", "prompt is malformed")),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("fine")))
        .mount(&server)
        .await;

    let model = builder_for(&server).build().unwrap();
    let results = model
        .infer(&prompts(&["good", "bad", "also good"]), &Options::new())
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().output_str(), "fine");
    assert_eq!(results[2].as_ref().unwrap().output_str(), "fine");

    let err = results[1].as_ref().unwrap_err();
    assert!(matches!(
        err.original(),
        AnthropicError::Api { status: 400, error_type, .. } if error_type == "invalid_request_error"
    ));
    assert!(err.to_string().contains("prompt is malformed"));
}

#[tokio::test]
async fn test_authentication_failure_in_every_slot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(error_body("authentication_error", "invalid x-api-key")),
        )
        .expect(2)
        .mount(&server)
        .await;

    let model = builder_for(&server).build().unwrap();
    let results = model
        .infer(&prompts(&["a", "b"]), &Options::new())
        .await
        .unwrap();

    for result in &results {
        assert!(matches!(
            result.as_ref().unwrap_err().original(),
            AnthropicError::AuthenticationFailed
        ));
    }
}

#[tokio::test]
async fn test_overload_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(
            ResponseTemplate::new(529).set_body_json(error_body("overloaded_error", "Overloaded")),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("recovered")))
        .mount(&server)
        .await;

    let model = builder_for(&server)
        .client_config(
            ClientConfig::default()
                .with_base_url(server.uri())
                .with_max_retries(2)
                .with_retry_delay_ms(1),
        )
        .build()
        .unwrap();
    let results = model
        .infer(&prompts(&["hello"]), &Options::new())
        .await
        .unwrap();

    assert_eq!(results[0].as_ref().unwrap().output_str(), "recovered");
}

#[tokio::test]
async fn test_blank_prompt_fails_only_its_slot() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let model = builder_for(&server).build().unwrap();
    let results = model
        .infer(&prompts(&["   ", "real prompt"]), &Options::new())
        .await
        .unwrap();

    assert!(matches!(
        results[0].as_ref().unwrap_err().original(),
        AnthropicError::InvalidRequest { .. }
    ));
    assert!(results[1].is_ok());
}

#[tokio::test]
async fn test_rejected_override_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("ok")))
        .expect(0)
        .mount(&server)
        .await;

    let model = builder_for(&server).build().unwrap();
    let mut overrides = Options::new();
    overrides.insert("stream".to_string(), json!(true));
    let err = model
        .infer(&prompts(&["a", "b"]), &overrides)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Unsupported parameter provided: stream");
}

#[tokio::test]
async fn test_rejected_construction_option() {
    let server = MockServer::start().await;
    let err = builder_for(&server)
        .option("tools", json!([]))
        .build()
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Config(ConfigError::UnsupportedParameter { name }) if name == "tools"
    ));
}

#[tokio::test]
async fn test_service_unavailable_is_retried() {
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
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("recovered")))
        .expect(1)
        .mount(&server)
        .await;

    let model = builder_for(&server)
        .client_config(
            ClientConfig::default()
                .with_base_url(server.uri())
                .with_max_retries(2)
                .with_retry_delay_ms(1),
        )
        .build()
        .unwrap();
    let results = model
        .infer(&prompts(&["hello"]), &Options::new())
        .await
        .unwrap();

    assert_eq!(results[0].as_ref().unwrap().output_str(), "recovered");
}
