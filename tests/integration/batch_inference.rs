//! Batch inference workflow tests.
//!
//! Tests construction, request shape, overrides, and ordering end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use anthropic_extract::anthropic::DEFAULT_MODEL;
use anthropic_extract::Options;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{builder_for, message_body, prompts, received_bodies};

#[tokio::test]
async fn test_default_model_and_call_time_system_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "test-api-key"))
        .and(body_partial_json(json!({
            "model": DEFAULT_MODEL,
            "system": "You are a helpful assistant for testing."
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("Hello there")))
        .expect(1)
        .mount(&server)
        .await;

    let model = builder_for(&server).build().unwrap();
    assert_eq!(model.model_name(), DEFAULT_MODEL);

    let mut overrides = Options::new();
    overrides.insert(
        "system".to_string(),
        json!("You are a helpful assistant for testing."),
    );
    let results = model
        .infer(&prompts(&["Say hello"]), &overrides)
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().output_str(), "Hello there");
}

#[tokio::test]
async fn test_construction_options_reach_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("ok")))
        .mount(&server)
        .await;

    let model = builder_for(&server)
        .model_id("anthropic-claude-3-5-haiku-latest")
        .option("temperature", 0.7)
        .option("max_tokens", 1000)
        .option("top_p", 0.9)
        .option("top_k", 50)
        .option("stop_sequences", json!(["\n", "STOP"]))
        .option("metadata", json!({"user_id": "test-user"}))
        .option("invalid_param", "should_be_ignored")
        .build()
        .unwrap();
    assert_eq!(model.extra_options().len(), 5);
    assert_eq!(model.temperature(), Some(0.7));

    model
        .infer(&prompts(&["Extract entities"]), &Options::new())
        .await
        .unwrap();

    let bodies = received_bodies(&server).await;
    assert_eq!(
        bodies[0],
        json!({
            "model": "claude-3-5-haiku-latest",
            "messages": [{"role": "user", "content": "Extract entities"}],
            "max_tokens": 1000,
            "temperature": 0.7,
            "top_p": 0.9,
            "top_k": 50,
            "stop_sequences": ["\n", "STOP"],
            "metadata": {"user_id": "test-user"}
        })
    );
}

#[tokio::test]
async fn test_results_follow_prompt_order() {
    let server = MockServer::start().await;
    for (prompt, delay_ms) in [("first", 150), ("second", 75), ("third", 0)] {
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(json!({
                "messages": [{"role": "user", "content": prompt}]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(message_body(&format!("answer to {prompt}")))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let model = builder_for(&server).max_workers(3).build().unwrap();
    let results = model
        .infer(&prompts(&["first", "second", "third"]), &Options::new())
        .await
        .unwrap();

    let outputs: Vec<&str> = results
        .iter()
        .map(|r| r.as_ref().unwrap().output_str())
        .collect();
    assert_eq!(
        outputs,
        vec!["answer to first", "answer to second", "answer to third"]
    );
}

#[tokio::test]
async fn test_overrides_do_not_persist() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("ok")))
        .mount(&server)
        .await;

    let model = builder_for(&server)
        .option("temperature", 0.5)
        .build()
        .unwrap();

    let mut overrides = Options::new();
    overrides.insert("temperature".to_string(), json!(0.0));
    overrides.insert("service_tier".to_string(), json!("standard_only"));
    model.infer(&prompts(&["one"]), &overrides).await.unwrap();
    model
        .infer(&prompts(&["two"]), &Options::new())
        .await
        .unwrap();

    let bodies = received_bodies(&server).await;
    assert_eq!(bodies[0]["temperature"], json!(0.0));
    assert_eq!(bodies[0]["service_tier"], json!("standard_only"));
    assert_eq!(bodies[1]["temperature"], json!(0.5));
    assert!(bodies[1].get("service_tier").is_none());
}

#[tokio::test]
async fn test_multiple_text_blocks_are_joined() {
    let server = MockServer::start().await;
    let mut body = message_body("line one");
    body["content"] = json!([
        {"type": "text", "text": "line one"},
        {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
        {"type": "text", "text": "line two"}
    ]);
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let model = builder_for(&server).build().unwrap();
    let results = model
        .infer(&prompts(&["hi"]), &Options::new())
        .await
        .unwrap();
    assert_eq!(
        results[0].as_ref().unwrap().output_str(),
        "line one\nline two"
    );
}

#[tokio::test]
async fn test_large_prompt_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("summarized")))
        .expect(1)
        .mount(&server)
        .await;

    let model = builder_for(&server).build().unwrap();
    let long_prompt = "word ".repeat(50_000);
    let results = model
        .infer(&[long_prompt.clone()], &Options::new())
        .await
        .unwrap();

    assert_eq!(results[0].as_ref().unwrap().output_str(), "summarized");
    let bodies = received_bodies(&server).await;
    assert_eq!(bodies[0]["messages"][0]["content"], json!(long_prompt));
}
