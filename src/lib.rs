//! Anthropic Messages API backend for structured extraction.
//!
//! Implements a language-model backend contract on top of the Anthropic
//! Messages API: option validation, model-name resolution, bounded parallel
//! batch inference, and optional schema-constrained output.
//!
//! # Features
//!
//! - Three-tier option policy: supported, rejected, silently dropped
//! - Ordered batch inference with a configurable worker cap
//! - Per-prompt error isolation
//! - Structured output through the `output_format` directive
//! - Retry with exponential backoff for transient API failures
//!
//! # Quick Start
//!
//! ```bash
//! ANTHROPIC_API_KEY=sk-ant-xxx ./anthropic-extract "Extract the names in: Ada met Alan."
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  prompts   ┌────────────────────────┐  N requests  ┌───────────────┐
//! │ Host / CLI   │───────────▶│ AnthropicLanguageModel │─────────────▶│ Anthropic API │
//! │              │◀───────────│  (params, schema, pool)│◀─────────────│ /v1/messages  │
//! └──────────────┘  results   └────────────────────────┘   responses  └───────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod anthropic;
pub mod config;
pub mod error;
pub mod params;
pub mod provider;
pub mod schema;
pub mod traits;

#[cfg(test)]
mod test_utils;

pub use error::{AnthropicError, ConfigError, InferenceError, ProviderError};
pub use provider::{AnthropicLanguageModel, AnthropicLanguageModelBuilder};
pub use schema::{AnthropicSchema, ExampleData, Extraction};
pub use traits::{LanguageModel, Options, PromptResult, ScoredOutput, StructuredOutputSchema};
