//! Structured output workflow tests.
//!
//! Tests schema application, the beta header, and schema removal.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use anthropic_extract::anthropic::STRUCTURED_OUTPUTS_BETA;
use anthropic_extract::{AnthropicSchema, ExampleData, Extraction, LanguageModel, Options};
use serde_json::{json, Map};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{builder_for, message_body, prompts, received_bodies};

#[tokio::test]
async fn test_schema_adds_output_format_and_beta_header() {
    let server = MockServer::start().await;
    let schema = json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    });
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("anthropic-beta", STRUCTURED_OUTPUTS_BETA))
        .and(body_partial_json(json!({
            "output_format": {"type": "json_schema", "schema": schema}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body(r#"{"name":"Ada"}"#)))
        .expect(1)
        .mount(&server)
        .await;

    let mut model = builder_for(&server).build().unwrap();
    model.apply_schema(Some(Arc::new(AnthropicSchema::new(schema))));
    assert!(!model.requires_fence_output());

    let results = model
        .infer(&prompts(&["Who wrote the first program?"]), &Options::new())
        .await
        .unwrap();
    let parsed: serde_json::Value =
        serde_json::from_str(results[0].as_ref().unwrap().output_str()).unwrap();
    assert_eq!(parsed["name"], "Ada");
}

#[tokio::test]
async fn test_clearing_schema_removes_directive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body("{}")))
        .mount(&server)
        .await;

    let mut model = builder_for(&server).build().unwrap();
    model.apply_schema(Some(Arc::new(AnthropicSchema::new(json!({"type": "object"})))));
    model
        .infer(&prompts(&["with schema"]), &Options::new())
        .await
        .unwrap();

    model.apply_schema(None);
    assert!(model.requires_fence_output());
    model
        .infer(&prompts(&["without schema"]), &Options::new())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("anthropic-beta").is_some());
    assert!(requests[1].headers.get("anthropic-beta").is_none());

    let bodies = received_bodies(&server).await;
    assert!(bodies[0].get("output_format").is_some());
    assert!(bodies[1].get("output_format").is_none());
}

#[tokio::test]
async fn test_example_schema_through_trait_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(message_body(
            r#"{"extractions":[{"medication":"aspirin"}]}"#,
        )))
        .mount(&server)
        .await;

    let mut dosage = Map::new();
    dosage.insert("dosage".to_string(), json!("100mg"));
    let examples = vec![ExampleData {
        text: "Take aspirin 100mg.".to_string(),
        extractions: vec![Extraction::new("medication", "aspirin").with_attributes(dosage)],
    }];

    let mut backend: Box<dyn LanguageModel> = Box::new(builder_for(&server).build().unwrap());
    backend.apply_schema(Some(Arc::new(AnthropicSchema::from_examples(&examples))));
    let results = backend
        .infer(&prompts(&["Patient takes ibuprofen."]), &Options::new())
        .await
        .unwrap();
    assert!(results[0].is_ok());

    let bodies = received_bodies(&server).await;
    let items = &bodies[0]["output_format"]["schema"]["properties"]["extractions"]["items"];
    assert_eq!(items["properties"]["medication"], json!({"type": "string"}));
    assert_eq!(
        items["properties"]["medication_attributes"]["properties"]["dosage"],
        json!({"type": "string"})
    );
}
