//! Anthropic backend for the language-model contract.
//!
//! [`AnthropicLanguageModel`] validates options once at construction, then
//! turns each [`infer`](AnthropicLanguageModel::infer) call into one Messages
//! API request per prompt, dispatched with bounded parallelism. Results come
//! back in prompt order and a failed prompt only affects its own slot.
//!
//! # Example
//!
//! ```no_run
//! use anthropic_extract::provider::AnthropicLanguageModel;
//! use anthropic_extract::traits::Options;
//!
//! # async fn run() -> Result<(), anthropic_extract::error::ProviderError> {
//! let model = AnthropicLanguageModel::builder()
//!     .model_id("anthropic-claude-3-5-haiku-latest")
//!     .api_key("sk-ant-xxx")
//!     .option("temperature", 0.2)
//!     .option("max_tokens", 512)
//!     .build()?;
//!
//! let results = model
//!     .infer(&["Name three rivers.".to_string()], &Options::new())
//!     .await?;
//! for result in results {
//!     match result {
//!         Ok(scored) => println!("{}", scored.output_str()),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::anthropic::{
    elapsed_ms, AnthropicClient, ClientConfig, MessagesRequest, OutputFormat, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL,
};
use crate::config::{Config, SecretString, DEFAULT_MAX_WORKERS, MAX_WORKERS_LIMIT};
use crate::error::{AnthropicError, ConfigError, InferenceError, ProviderError};
use crate::params::{filter_options, RequestParams};
use crate::schema::{AnthropicSchema, ExampleData};
use crate::traits::{
    LanguageModel, MessagesApi, Options, PromptResult, ScoredOutput, StructuredOutputSchema,
};

/// Prefix accepted on model ids and stripped before use.
pub const MODEL_ID_PREFIX: &str = "anthropic-";

/// Resolve a model id to the name sent on the wire.
///
/// ```
/// use anthropic_extract::provider::resolve_model_name;
///
/// assert_eq!(resolve_model_name(None), "claude-3-5-sonnet-latest");
/// assert_eq!(resolve_model_name(Some("anthropic-claude-3-opus")), "claude-3-opus");
/// assert_eq!(resolve_model_name(Some("claude-3-haiku")), "claude-3-haiku");
/// ```
#[must_use]
pub fn resolve_model_name(model_id: Option<&str>) -> String {
    match model_id {
        None => DEFAULT_MODEL.to_string(),
        Some(id) => id.strip_prefix(MODEL_ID_PREFIX).unwrap_or(id).to_string(),
    }
}

/// Messages API backend.
///
/// Generic over the client so tests can substitute a mock; production code
/// uses the default [`AnthropicClient`].
pub struct AnthropicLanguageModel<C = AnthropicClient> {
    model_id: Option<String>,
    model_name: String,
    api_key: SecretString,
    temperature: Option<f64>,
    max_workers: usize,
    extra_options: Options,
    defaults: RequestParams,
    response_schema: Option<Arc<dyn StructuredOutputSchema>>,
    structured_output: bool,
    client: Arc<C>,
}

impl<C> fmt::Debug for AnthropicLanguageModel<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicLanguageModel")
            .field("model_id", &self.model_id)
            .field("model_name", &self.model_name)
            .field("api_key", &self.api_key)
            .field("temperature", &self.temperature)
            .field("max_workers", &self.max_workers)
            .field("extra_options", &self.extra_options)
            .field("structured_output", &self.structured_output)
            .finish_non_exhaustive()
    }
}

impl AnthropicLanguageModel {
    /// Start building a backend.
    #[must_use]
    pub fn builder() -> AnthropicLanguageModelBuilder {
        AnthropicLanguageModelBuilder::default()
    }

    /// Build a backend from environment-derived configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] if the configuration is rejected or the HTTP
    /// client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let mut builder = Self::builder()
            .api_key(config.api_key.clone())
            .max_workers(config.max_workers)
            .client_config(config.client_config());
        if let Some(model_id) = &config.model_id {
            builder = builder.model_id(model_id);
        }
        builder.build()
    }
}

impl<C: MessagesApi> AnthropicLanguageModel<C> {
    /// Model id as supplied, prefix included.
    #[must_use]
    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    /// Model name sent on the wire.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// API key.
    #[must_use]
    pub const fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    /// Default sampling temperature, if one was supplied.
    #[must_use]
    pub const fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    /// Maximum requests in flight per batch.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Accepted construction options, `temperature` excluded.
    #[must_use]
    pub const fn extra_options(&self) -> &Options {
        &self.extra_options
    }

    /// Schema applied with [`apply_schema`](Self::apply_schema), if any.
    #[must_use]
    pub fn response_schema(&self) -> Option<&Arc<dyn StructuredOutputSchema>> {
        self.response_schema.as_ref()
    }

    /// Whether requests carry an `output_format` directive.
    #[must_use]
    pub const fn structured_output_enabled(&self) -> bool {
        self.structured_output
    }

    /// Enable structured output with `schema`, or disable it with `None`.
    pub fn apply_schema(&mut self, schema: Option<Arc<dyn StructuredOutputSchema>>) {
        self.structured_output = schema.is_some();
        self.response_schema = schema;
    }

    /// Fenced output is expected unless an applied schema is enforced strictly.
    #[must_use]
    pub fn requires_fence_output(&self) -> bool {
        match &self.response_schema {
            Some(schema) if self.structured_output => !schema.supports_strict_mode(),
            _ => true,
        }
    }

    /// Run one completion per prompt.
    ///
    /// `overrides` apply to this call only. The result has one slot per
    /// prompt, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an override is rejected. Nothing is sent
    /// in that case. Per-prompt failures are reported in their slot.
    pub async fn infer(
        &self,
        prompts: &[String],
        overrides: &Options,
    ) -> Result<Vec<PromptResult>, ConfigError> {
        let accepted = filter_options(overrides)?;
        let params = self
            .defaults
            .clone()
            .overridden_by(RequestParams::from_options(&accepted)?);

        if prompts.is_empty() {
            return Ok(Vec::new());
        }

        let output_format = self.output_format();
        let requests: Vec<MessagesRequest> = prompts
            .iter()
            .map(|prompt| {
                let mut request = params.apply_to(MessagesRequest::single_prompt(
                    &self.model_name,
                    DEFAULT_MAX_TOKENS,
                    prompt,
                ));
                request.output_format.clone_from(&output_format);
                request
            })
            .collect();

        let batch_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "infer",
            batch_id = %batch_id,
            prompts = prompts.len(),
            max_workers = self.max_workers
        );

        let results = stream::iter(requests.into_iter().enumerate())
            .map(|(index, request)| self.dispatch(index, request))
            .buffered(self.max_workers)
            .collect::<Vec<_>>()
            .instrument(span)
            .await;

        Ok(results)
    }

    fn output_format(&self) -> Option<OutputFormat> {
        if !self.structured_output {
            return None;
        }
        self.response_schema
            .as_ref()
            .map(|schema| schema.to_output_format())
    }

    async fn dispatch(&self, index: usize, request: MessagesRequest) -> PromptResult {
        let start = Instant::now();
        let response = self.client.as_ref().create_message(request).await;
        let elapsed_ms = elapsed_ms(start);

        match response {
            Ok(response) => match response.text() {
                Some(text) => {
                    tracing::debug!(
                        index,
                        elapsed_ms,
                        tokens = response.usage.total(),
                        "Prompt completed"
                    );
                    Ok(ScoredOutput::text(text))
                }
                None => {
                    tracing::error!(index, elapsed_ms, "Response had no text content");
                    Err(InferenceError::from(AnthropicError::UnexpectedResponse {
                        status: None,
                        message: "Response contained no text content".to_string(),
                    }))
                }
            },
            Err(e) => {
                tracing::error!(index, elapsed_ms, error = %e, "Prompt failed");
                Err(InferenceError::from(e))
            }
        }
    }
}

#[async_trait]
impl<C: MessagesApi> LanguageModel for AnthropicLanguageModel<C> {
    async fn infer(
        &self,
        prompts: &[String],
        overrides: &Options,
    ) -> Result<Vec<PromptResult>, ConfigError> {
        Self::infer(self, prompts, overrides).await
    }

    fn apply_schema(&mut self, schema: Option<Arc<dyn StructuredOutputSchema>>) {
        Self::apply_schema(self, schema);
    }

    fn requires_fence_output(&self) -> bool {
        Self::requires_fence_output(self)
    }

    fn schema_from_examples(&self, examples: &[ExampleData]) -> Arc<dyn StructuredOutputSchema> {
        Arc::new(AnthropicSchema::from_examples(examples))
    }
}

/// Builder for [`AnthropicLanguageModel`].
#[derive(Debug, Default)]
pub struct AnthropicLanguageModelBuilder {
    model_id: Option<String>,
    api_key: Option<SecretString>,
    max_workers: Option<usize>,
    options: Options,
    client_config: Option<ClientConfig>,
}

impl AnthropicLanguageModelBuilder {
    /// Model id, optionally carrying the `anthropic-` prefix.
    #[must_use]
    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// API key. Required.
    #[must_use]
    pub fn api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Maximum requests in flight per batch. Defaults to 10, at most 64.
    #[must_use]
    pub const fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Add one keyword option.
    #[must_use]
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Add several keyword options.
    #[must_use]
    pub fn options(mut self, options: Options) -> Self {
        self.options.extend(options);
        self
    }

    /// Transport settings for the default HTTP client.
    #[must_use]
    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = Some(config);
        self
    }

    /// Build with the default HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Config`] if validation fails, or
    /// [`ProviderError::Anthropic`] if the HTTP client cannot be created.
    pub fn build(mut self) -> Result<AnthropicLanguageModel, ProviderError> {
        let client_config = self.client_config.take().unwrap_or_default();
        let settings = self.validate()?;
        let client = AnthropicClient::new(settings.api_key.clone(), client_config)?;
        Ok(settings.into_model(client))
    }

    /// Build around an existing client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if validation fails.
    pub fn build_with_client<C: MessagesApi>(
        self,
        client: C,
    ) -> Result<AnthropicLanguageModel<C>, ConfigError> {
        Ok(self.validate()?.into_model(client))
    }

    fn validate(self) -> Result<Settings, ConfigError> {
        let api_key = self
            .api_key
            .filter(|key| !key.is_blank())
            .ok_or(ConfigError::MissingApiKey)?;

        let max_workers = self.max_workers.unwrap_or(DEFAULT_MAX_WORKERS);
        if !(1..=MAX_WORKERS_LIMIT).contains(&max_workers) {
            return Err(ConfigError::InvalidValue {
                var: "max_workers".to_string(),
                reason: format!("must be between 1 and {MAX_WORKERS_LIMIT}"),
            });
        }

        let mut extra_options = filter_options(&self.options)?;
        let defaults = RequestParams::from_options(&extra_options)?;
        extra_options.remove("temperature");

        let model_name = resolve_model_name(self.model_id.as_deref());
        tracing::debug!(
            model = %model_name,
            max_workers,
            options = extra_options.len(),
            "Configured Anthropic backend"
        );

        Ok(Settings {
            model_id: self.model_id,
            model_name,
            api_key,
            max_workers,
            extra_options,
            defaults,
        })
    }
}

struct Settings {
    model_id: Option<String>,
    model_name: String,
    api_key: SecretString,
    max_workers: usize,
    extra_options: Options,
    defaults: RequestParams,
}

impl Settings {
    fn into_model<C>(self, client: C) -> AnthropicLanguageModel<C> {
        AnthropicLanguageModel {
            model_id: self.model_id,
            model_name: self.model_name,
            api_key: self.api_key,
            temperature: self.defaults.temperature,
            max_workers: self.max_workers,
            extra_options: self.extra_options,
            defaults: self.defaults,
            response_schema: None,
            structured_output: false,
            client: Arc::new(client),
        }
    }
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
    use crate::test_utils::{
        mock_messages_capturing, mock_messages_error, mock_messages_success, prompts,
        DelayedEcho,
    };
    use crate::traits::MockMessagesApi;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn options(value: Value) -> Options {
        match value {
            Value::Object(map) => map,
            _ => Options::new(),
        }
    }

    fn model_with(mock: MockMessagesApi) -> AnthropicLanguageModel<MockMessagesApi> {
        AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .build_with_client(mock)
            .unwrap()
    }

    #[test]
    fn test_resolve_model_name() {
        assert_eq!(resolve_model_name(None), DEFAULT_MODEL);
        assert_eq!(
            resolve_model_name(Some("anthropic-claude-3-5-sonnet-latest")),
            "claude-3-5-sonnet-latest"
        );
        assert_eq!(
            resolve_model_name(Some("claude-3-opus-20240229")),
            "claude-3-opus-20240229"
        );
        // Only a leading prefix is stripped, and only once.
        assert_eq!(
            resolve_model_name(Some("anthropic-anthropic-x")),
            "anthropic-x"
        );
        assert_eq!(
            resolve_model_name(Some("my-anthropic-model")),
            "my-anthropic-model"
        );
    }

    #[test]
    fn test_build_requires_api_key() {
        let err = AnthropicLanguageModel::builder()
            .build_with_client(MockMessagesApi::new())
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey);
        assert_eq!(err.to_string(), "API key not provided");

        let err = AnthropicLanguageModel::builder()
            .api_key("  ")
            .build_with_client(MockMessagesApi::new())
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey);
    }

    #[test]
    fn test_build_default_http_client() {
        let model = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .build()
            .unwrap();
        assert_eq!(model.model_name(), DEFAULT_MODEL);
        assert!(model.model_id().is_none());
    }

    #[test]
    fn test_build_missing_key_is_config_error() {
        let err = AnthropicLanguageModel::builder().build().unwrap_err();
        assert!(matches!(
            err,
            ProviderError::Config(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn test_construction_filters_options() {
        let model = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .option("temperature", 0.7)
            .option("max_tokens", 1000)
            .option("top_p", 0.9)
            .option("top_k", 50)
            .option("stop_sequences", json!(["\n", "STOP"]))
            .option("metadata", json!({"user": "test-user"}))
            .option("invalid_param", "should_be_ignored")
            .build_with_client(MockMessagesApi::new())
            .unwrap();

        assert_eq!(model.temperature(), Some(0.7));
        let extra = model.extra_options();
        assert_eq!(extra.len(), 5);
        assert_eq!(extra["max_tokens"], json!(1000));
        assert_eq!(extra["top_p"], json!(0.9));
        assert_eq!(extra["top_k"], json!(50));
        assert_eq!(extra["stop_sequences"], json!(["\n", "STOP"]));
        assert_eq!(extra["metadata"], json!({"user": "test-user"}));
        assert!(!extra.contains_key("invalid_param"));
        assert!(!extra.contains_key("temperature"));
    }

    #[test]
    fn test_construction_rejects_unsupported_params() {
        for name in ["stream", "tools", "tool_choice", "thinking"] {
            let err = AnthropicLanguageModel::builder()
                .api_key("test-api-key")
                .option(name, true)
                .build_with_client(MockMessagesApi::new())
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Unsupported parameter provided: {name}")
            );
        }
    }

    #[test]
    fn test_construction_rejects_bad_option_value() {
        let err = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .option("top_k", "fifty")
            .build_with_client(MockMessagesApi::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "top_k"));
    }

    #[test]
    fn test_api_key_checked_before_options() {
        let err = AnthropicLanguageModel::builder()
            .option("stream", true)
            .build_with_client(MockMessagesApi::new())
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingApiKey);
    }

    #[test]
    fn test_max_workers() {
        let model = model_with(MockMessagesApi::new());
        assert_eq!(model.max_workers(), DEFAULT_MAX_WORKERS);

        let model = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .max_workers(3)
            .build_with_client(MockMessagesApi::new())
            .unwrap();
        assert_eq!(model.max_workers(), 3);

        let err = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .max_workers(0)
            .build_with_client(MockMessagesApi::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "max_workers"));
    }

    #[test]
    fn test_max_workers_upper_bound_matches_config() {
        let model = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .max_workers(MAX_WORKERS_LIMIT)
            .build_with_client(MockMessagesApi::new())
            .unwrap();
        assert_eq!(model.max_workers(), MAX_WORKERS_LIMIT);

        let err = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .max_workers(MAX_WORKERS_LIMIT + 1)
            .build_with_client(MockMessagesApi::new())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "max_workers"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let model = AnthropicLanguageModel::builder()
            .model_id("anthropic-claude-3-haiku")
            .api_key("sk-ant-secret-value")
            .build_with_client(MockMessagesApi::new())
            .unwrap();
        let debug = format!("{model:?}");
        assert!(!debug.contains("sk-ant-secret-value"));
        assert!(debug.contains("<REDACTED>"));
        assert!(debug.contains("claude-3-haiku"));
        assert_eq!(model.api_key().expose(), "sk-ant-secret-value");
    }

    #[tokio::test]
    async fn test_infer_empty_prompts_sends_nothing() {
        let mut mock = MockMessagesApi::new();
        mock.expect_create_message().times(0);
        let model = model_with(mock);

        let results = model.infer(&[], &Options::new()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_infer_single_prompt() {
        let model = model_with(mock_messages_success("Paris"));
        let results = model
            .infer(&prompts(&["Capital of France?"]), &Options::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let scored = results[0].as_ref().unwrap();
        assert_eq!(scored.output_str(), "Paris");
        assert_eq!(scored.score, Some(1.0));
    }

    #[tokio::test]
    async fn test_infer_request_shape() {
        let (mock, captured) = mock_messages_capturing();
        let model = AnthropicLanguageModel::builder()
            .model_id("anthropic-claude-3-haiku")
            .api_key("test-api-key")
            .option("temperature", 0.3)
            .option("top_k", 20)
            .build_with_client(mock)
            .unwrap();

        model
            .infer(&prompts(&["hello"]), &Options::new())
            .await
            .unwrap();

        let requests = captured.lock().unwrap();
        let body = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "claude-3-haiku",
                "messages": [{"role": "user", "content": "hello"}],
                "max_tokens": DEFAULT_MAX_TOKENS,
                "temperature": 0.3,
                "top_k": 20
            })
        );
    }

    #[tokio::test]
    async fn test_infer_overrides_apply_to_one_call() {
        let (mock, captured) = mock_messages_capturing();
        let model = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .option("temperature", 0.7)
            .option("max_tokens", 1000)
            .build_with_client(mock)
            .unwrap();

        let overrides = options(json!({
            "temperature": 0.1,
            "system": "You are a helpful assistant for testing.",
            "unknown_option": 123
        }));
        model
            .infer(&prompts(&["first"]), &overrides)
            .await
            .unwrap();
        model
            .infer(&prompts(&["second"]), &Options::new())
            .await
            .unwrap();

        let requests = captured.lock().unwrap();
        assert_eq!(requests[0].temperature, Some(0.1));
        assert_eq!(
            requests[0].system.as_deref(),
            Some("You are a helpful assistant for testing.")
        );
        assert_eq!(requests[0].max_tokens, 1000);

        assert_eq!(requests[1].temperature, Some(0.7));
        assert_eq!(requests[1].system, None);
        assert_eq!(requests[1].max_tokens, 1000);

        assert_eq!(model.temperature(), Some(0.7));
        assert!(!model.extra_options().contains_key("system"));
    }

    #[tokio::test]
    async fn test_infer_rejects_unsupported_override_before_sending() {
        let mut mock = MockMessagesApi::new();
        mock.expect_create_message().times(0);
        let model = model_with(mock);

        for name in ["stream", "tools", "tool_choice", "thinking"] {
            let err = model
                .infer(&prompts(&["hi"]), &options(json!({ name: true })))
                .await
                .unwrap_err();
            assert_eq!(
                err,
                ConfigError::UnsupportedParameter {
                    name: name.to_string()
                }
            );
        }
    }

    #[tokio::test]
    async fn test_infer_rejects_bad_override_value() {
        let mut mock = MockMessagesApi::new();
        mock.expect_create_message().times(0);
        let model = model_with(mock);

        let err = model
            .infer(&prompts(&["hi"]), &options(json!({"max_tokens": "many"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { var, .. } if var == "max_tokens"));
    }

    #[tokio::test]
    async fn test_infer_null_override_keeps_default() {
        let (mock, captured) = mock_messages_capturing();
        let model = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .option("system", "default system")
            .build_with_client(mock)
            .unwrap();

        model
            .infer(&prompts(&["hi"]), &options(json!({"system": null})))
            .await
            .unwrap();
        assert_eq!(
            captured.lock().unwrap()[0].system.as_deref(),
            Some("default system")
        );
    }

    #[tokio::test]
    async fn test_infer_isolated_failure() {
        let (mock, captured) = mock_messages_capturing();
        let model = model_with(mock);

        let results = model
            .infer(&prompts(&["one", "please fail", "three"]), &Options::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().output_str(), "echo: one");
        assert_eq!(results[2].as_ref().unwrap().output_str(), "echo: three");

        let err = results[1].as_ref().unwrap_err();
        assert!(err.to_string().starts_with("Anthropic API error:"));
        assert!(err.to_string().contains("Internal server error"));
        assert!(matches!(err.original(), AnthropicError::Api { status: 500, .. }));
        assert_eq!(captured.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_infer_all_failing() {
        let model = model_with(mock_messages_error(AnthropicError::AuthenticationFailed));
        let results = model
            .infer(&prompts(&["a", "b"]), &Options::new())
            .await
            .unwrap();
        assert!(results.iter().all(|r| matches!(
            r.as_ref().map_err(InferenceError::original),
            Err(AnthropicError::AuthenticationFailed)
        )));
    }

    #[tokio::test]
    async fn test_infer_response_without_text_is_slot_error() {
        let mut mock = MockMessagesApi::new();
        mock.expect_create_message().returning(|request| {
            let mut response = crate::anthropic::MessagesResponse::from_text(request.model, "");
            response.content.clear();
            Ok(response)
        });
        let model = model_with(mock);

        let results = model
            .infer(&prompts(&["hi"]), &Options::new())
            .await
            .unwrap();
        assert!(matches!(
            results[0].as_ref().unwrap_err().original(),
            AnthropicError::UnexpectedResponse { .. }
        ));
    }

    #[tokio::test]
    async fn test_infer_preserves_order_and_bounds_concurrency() {
        let model = AnthropicLanguageModel::builder()
            .api_key("test-api-key")
            .max_workers(2)
            .build_with_client(DelayedEcho::default())
            .unwrap();

        // Earlier prompts finish later.
        let batch = prompts(&["60", "40", "20", "5", "1"]);
        let results = model.infer(&batch, &Options::new()).await.unwrap();

        let outputs: Vec<&str> = results
            .iter()
            .map(|r| r.as_ref().unwrap().output_str())
            .collect();
        assert_eq!(outputs, vec!["60", "40", "20", "5", "1"]);
        assert!(model.client.peak() <= 2);
        assert!(model.client.peak() >= 1);
    }

    #[tokio::test]
    async fn test_apply_schema_toggles_output_format() {
        let (mock, captured) = mock_messages_capturing();
        let mut model = model_with(mock);
        assert!(!model.structured_output_enabled());
        assert!(model.requires_fence_output());

        let raw = json!({"type": "object", "properties": {"name": {"type": "string"}}});
        model.apply_schema(Some(Arc::new(AnthropicSchema::new(raw.clone()))));
        assert!(model.structured_output_enabled());
        assert!(model.response_schema().is_some());
        assert!(!model.requires_fence_output());

        model
            .infer(&prompts(&["structured"]), &Options::new())
            .await
            .unwrap();

        model.apply_schema(None);
        assert!(!model.structured_output_enabled());
        assert!(model.response_schema().is_none());
        model
            .infer(&prompts(&["plain"]), &Options::new())
            .await
            .unwrap();

        let requests = captured.lock().unwrap();
        assert_eq!(
            requests[0].output_format,
            Some(OutputFormat::json_schema(raw))
        );
        assert_eq!(requests[1].output_format, None);
    }

    #[derive(Debug)]
    struct LooseSchema;

    impl StructuredOutputSchema for LooseSchema {
        fn to_output_format(&self) -> OutputFormat {
            OutputFormat::json_schema(json!({"type": "object"}))
        }

        fn supports_strict_mode(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_non_strict_schema_still_requires_fences() {
        let mut model = model_with(MockMessagesApi::new());
        model.apply_schema(Some(Arc::new(LooseSchema)));
        assert!(model.structured_output_enabled());
        assert!(model.requires_fence_output());
    }

    #[test]
    fn test_schema_from_examples_builds_anthropic_schema() {
        let model = model_with(MockMessagesApi::new());
        let backend: &dyn LanguageModel = &model;
        let examples = vec![ExampleData {
            text: "Take aspirin.".to_string(),
            extractions: vec![crate::schema::Extraction::new("medication", "aspirin")],
        }];

        let schema = backend.schema_from_examples(&examples);
        let expected = AnthropicSchema::from_examples(&examples).to_output_format();
        assert_eq!(schema.to_output_format(), expected);
        assert!(schema.supports_strict_mode());
    }

    #[tokio::test]
    async fn test_language_model_trait_object() {
        let model = model_with(mock_messages_success("via trait"));
        let backend: Box<dyn LanguageModel> = Box::new(model);

        let results = backend
            .infer(&prompts(&["hi"]), &Options::new())
            .await
            .unwrap();
        assert_eq!(results[0].as_ref().unwrap().output_str(), "via trait");
        assert!(backend.requires_fence_output());
    }

    #[test]
    fn test_from_config() {
        let config = Config {
            api_key: SecretString::new("sk-ant-config-key"),
            model_id: Some("anthropic-claude-3-opus-latest".to_string()),
            base_url: "http://localhost:9999".to_string(),
            log_level: "info".to_string(),
            request_timeout_ms: 5_000,
            max_retries: 1,
            max_workers: 4,
        };
        let model = AnthropicLanguageModel::from_config(&config).unwrap();
        assert_eq!(model.model_name(), "claude-3-opus-latest");
        assert_eq!(model.model_id(), Some("anthropic-claude-3-opus-latest"));
        assert_eq!(model.max_workers(), 4);
        assert_eq!(model.client.base_url(), "http://localhost:9999");
    }
}
