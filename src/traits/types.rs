//! Shared types for the traits module.
//!
//! - [`Options`]: keyword options passed at construction or call time
//! - [`ScoredOutput`]: one generated output for a prompt
//! - [`PromptResult`]: the result slot for one prompt

use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

/// Keyword options keyed by parameter name.
///
/// Values keep their JSON shape until they are validated into request fields.
pub type Options = serde_json::Map<String, serde_json::Value>;

/// Result slot for one prompt: an output or the error for that prompt alone.
pub type PromptResult = Result<ScoredOutput, InferenceError>;

/// A generated output with an optional score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredOutput {
    /// Score assigned by the backend, if any.
    pub score: Option<f64>,
    /// Generated text.
    pub output: Option<String>,
}

impl ScoredOutput {
    /// Output with full confidence, as returned for a single completion.
    #[must_use]
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            score: Some(1.0),
            output: Some(output.into()),
        }
    }

    /// Output text, or an empty string when there is none.
    #[must_use]
    pub fn output_str(&self) -> &str {
        self.output.as_deref().unwrap_or_default()
    }
}
