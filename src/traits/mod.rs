//! Trait definitions at the crate's seams.
//!
//! - [`MessagesApi`]: the vendor client, mocked in adapter tests
//! - [`StructuredOutputSchema`]: opaque schema collaborator
//! - [`LanguageModel`]: the backend contract the host framework calls
//!
//! # Mocking
//!
//! [`MessagesApi`] is annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates `MockMessagesApi` for unit tests.

mod types;

pub use types::{Options, PromptResult, ScoredOutput};

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

use crate::anthropic::{MessagesRequest, MessagesResponse, OutputFormat};
use crate::error::{AnthropicError, ConfigError};
use crate::schema::ExampleData;

/// Messages API client.
///
/// Implementations must be safe to share across concurrent requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessagesApi: Send + Sync {
    /// Send one Messages API request.
    ///
    /// # Errors
    ///
    /// Returns [`AnthropicError`] if the request fails after any retries.
    async fn create_message(
        &self,
        request: MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError>;
}

#[async_trait]
impl<T: MessagesApi + ?Sized> MessagesApi for Arc<T> {
    async fn create_message(
        &self,
        request: MessagesRequest,
    ) -> Result<MessagesResponse, AnthropicError> {
        self.as_ref().create_message(request).await
    }
}

/// Structured-output schema.
///
/// The adapter only asks for the vendor directive; it never inspects the
/// schema itself.
pub trait StructuredOutputSchema: Send + Sync + Debug {
    /// The `output_format` directive to attach to every request.
    fn to_output_format(&self) -> OutputFormat;

    /// Whether the vendor enforces the schema strictly. A non-strict schema
    /// leaves fenced output expected.
    fn supports_strict_mode(&self) -> bool {
        true
    }
}

/// Language-model backend contract.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one independent completion per prompt.
    ///
    /// The returned vector has one slot per prompt, in input order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an override is rejected. No request is
    /// sent in that case.
    async fn infer(
        &self,
        prompts: &[String],
        overrides: &Options,
    ) -> Result<Vec<PromptResult>, ConfigError>;

    /// Enable structured output with `schema`, or disable it with `None`.
    fn apply_schema(&mut self, schema: Option<Arc<dyn StructuredOutputSchema>>);

    /// Whether callers should expect fenced output blocks.
    fn requires_fence_output(&self) -> bool;

    /// The schema type this backend understands, built from few-shot examples.
    fn schema_from_examples(&self, examples: &[ExampleData]) -> Arc<dyn StructuredOutputSchema>;
}
