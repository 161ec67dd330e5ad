//! Option allow-list and request parameter validation.
//!
//! Every option name falls into one of three tiers:
//!
//! | Tier | Names | Effect |
//! |------|-------|--------|
//! | supported | [`SUPPORTED_PARAMS`] | type-checked and kept |
//! | rejected | [`UNSUPPORTED_PARAMS`] | [`ConfigError::UnsupportedParameter`] |
//! | unknown | anything else | dropped without error |
//!
//! The same policy applies at construction and at call time. Rejected names
//! are checked before anything else, so an options map holding a rejected
//! name always fails, whatever else it contains.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::anthropic::MessagesRequest;
use crate::error::ConfigError;
use crate::traits::Options;

/// Options this backend forwards to the Messages API.
pub const SUPPORTED_PARAMS: [&str; 8] = [
    "max_tokens",
    "temperature",
    "top_p",
    "top_k",
    "stop_sequences",
    "metadata",
    "system",
    "service_tier",
];

/// Recognized options this backend deliberately does not implement.
pub const UNSUPPORTED_PARAMS: [&str; 4] = ["stream", "tools", "tool_choice", "thinking"];

/// Every recognized option name.
pub const ANTHROPIC_CONFIG_KEYS: [&str; 12] = [
    "max_tokens",
    "temperature",
    "top_p",
    "top_k",
    "stop_sequences",
    "metadata",
    "system",
    "service_tier",
    "stream",
    "tools",
    "tool_choice",
    "thinking",
];

/// What happens to an option name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamTier {
    /// Recognized and forwarded.
    Supported,
    /// Recognized but always an error.
    Rejected,
    /// Not recognized; silently dropped.
    Unknown,
}

/// Classify an option name. Rejection is checked first.
#[must_use]
pub fn classify(name: &str) -> ParamTier {
    if UNSUPPORTED_PARAMS.contains(&name) {
        ParamTier::Rejected
    } else if SUPPORTED_PARAMS.contains(&name) {
        ParamTier::Supported
    } else {
        ParamTier::Unknown
    }
}

/// Whether `name` is in the recognized key set.
#[must_use]
pub fn is_recognized(name: &str) -> bool {
    ANTHROPIC_CONFIG_KEYS.contains(&name)
}

/// Apply the three-tier policy to `options`.
///
/// Returns the supported subset with values unchanged.
///
/// # Errors
///
/// - [`ConfigError::UnsupportedParameter`] if any rejected name is present
/// - [`ConfigError::InvalidValue`] if a supported value has the wrong shape
pub fn filter_options(options: &Options) -> Result<Options, ConfigError> {
    if let Some(name) = options
        .keys()
        .find(|name| classify(name) == ParamTier::Rejected)
    {
        return Err(ConfigError::UnsupportedParameter { name: name.clone() });
    }

    let mut accepted = Options::new();
    for (name, value) in options {
        match classify(name) {
            ParamTier::Supported => {
                check_value(name, value)?;
                accepted.insert(name.clone(), value.clone());
            }
            ParamTier::Unknown => {
                tracing::debug!(param = %name, "Dropping unrecognized option");
            }
            ParamTier::Rejected => {}
        }
    }
    Ok(accepted)
}

/// Typed view of the supported options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold.
    pub top_p: Option<f64>,
    /// Top-k cutoff.
    pub top_k: Option<u32>,
    /// Stop sequences.
    pub stop_sequences: Option<Vec<String>>,
    /// Metadata object.
    pub metadata: Option<Map<String, Value>>,
    /// System prompt.
    pub system: Option<String>,
    /// Service tier.
    pub service_tier: Option<String>,
}

impl RequestParams {
    /// Parse the supported options out of `options`.
    ///
    /// Unknown names are ignored and `null` values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a value has the wrong shape.
    pub fn from_options(options: &Options) -> Result<Self, ConfigError> {
        Ok(Self {
            max_tokens: field(options, "max_tokens")?,
            temperature: field(options, "temperature")?,
            top_p: field(options, "top_p")?,
            top_k: field(options, "top_k")?,
            stop_sequences: field(options, "stop_sequences")?,
            metadata: field(options, "metadata")?,
            system: field(options, "system")?,
            service_tier: field(options, "service_tier")?,
        })
    }

    /// Field-by-field overlay: values set in `overrides` win.
    #[must_use]
    pub fn overridden_by(self, overrides: Self) -> Self {
        Self {
            max_tokens: overrides.max_tokens.or(self.max_tokens),
            temperature: overrides.temperature.or(self.temperature),
            top_p: overrides.top_p.or(self.top_p),
            top_k: overrides.top_k.or(self.top_k),
            stop_sequences: overrides.stop_sequences.or(self.stop_sequences),
            metadata: overrides.metadata.or(self.metadata),
            system: overrides.system.or(self.system),
            service_tier: overrides.service_tier.or(self.service_tier),
        }
    }

    /// Copy every set field onto `request`. `max_tokens` only replaces the
    /// request's value when set here.
    #[must_use]
    pub fn apply_to(&self, mut request: MessagesRequest) -> MessagesRequest {
        if let Some(max_tokens) = self.max_tokens {
            request.max_tokens = max_tokens;
        }
        request.temperature = self.temperature;
        request.top_p = self.top_p;
        request.top_k = self.top_k;
        request.stop_sequences.clone_from(&self.stop_sequences);
        request.metadata.clone_from(&self.metadata);
        request.system.clone_from(&self.system);
        request.service_tier.clone_from(&self.service_tier);
        request
    }
}

/// Expected shape of each supported option, for error messages.
fn expected_shape(name: &str) -> &'static str {
    match name {
        "max_tokens" | "top_k" => "a non-negative integer",
        "temperature" | "top_p" => "a number",
        "stop_sequences" => "a list of strings",
        "metadata" => "an object",
        _ => "a string",
    }
}

fn check_value(name: &str, value: &Value) -> Result<(), ConfigError> {
    let mut single = Options::new();
    single.insert(name.to_string(), value.clone());
    RequestParams::from_options(&single).map(|_| ())
}

fn field<T: DeserializeOwned>(options: &Options, name: &str) -> Result<Option<T>, ConfigError> {
    match options.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: name.to_string(),
                reason: format!("expected {}, got {value}", expected_shape(name)),
            }),
    }
}
