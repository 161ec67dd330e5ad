//! Structured-output schemas for the Messages API.
//!
//! [`AnthropicSchema`] wraps a JSON Schema document and hands it to the
//! backend as an `output_format` directive. A schema can come from a raw
//! document, from a Rust type deriving [`schemars::JsonSchema`], or from
//! few-shot extraction examples.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::anthropic::OutputFormat;
use crate::traits::StructuredOutputSchema;

/// Key of the top-level array in example-derived schemas.
pub const EXTRACTIONS_KEY: &str = "extractions";

/// Suffix of the per-class attribute object property.
pub const ATTRIBUTE_SUFFIX: &str = "_attributes";

/// One labelled span in a few-shot example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// Class label, e.g. `"medication"`.
    pub extraction_class: String,
    /// Text of the span.
    pub extraction_text: String,
    /// Optional attributes attached to the span.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
}

impl Extraction {
    /// Extraction without attributes.
    #[must_use]
    pub fn new(class: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            extraction_class: class.into(),
            extraction_text: text.into(),
            attributes: None,
        }
    }

    /// Attach attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = Some(attributes);
        self
    }
}

/// A few-shot example: source text plus its expected extractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleData {
    /// Source text.
    pub text: String,
    /// Extractions expected for `text`.
    #[serde(default)]
    pub extractions: Vec<Extraction>,
}

/// JSON Schema sent as the `output_format` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct AnthropicSchema {
    schema: Value,
}

impl AnthropicSchema {
    /// Wrap a JSON Schema document as-is.
    #[must_use]
    pub fn new(schema: Value) -> Self {
        Self { schema }
    }

    /// Schema generated from a Rust type.
    #[must_use]
    pub fn for_type<T: JsonSchema>() -> Self {
        Self::new(Value::from(schemars::schema_for!(T)))
    }

    /// Schema derived from few-shot examples.
    ///
    /// Every class seen in the examples becomes an optional string property
    /// of an extraction item, paired with a `<class>_attributes` object.
    /// Attribute values that are arrays are typed as string arrays, all other
    /// attributes as strings.
    #[must_use]
    pub fn from_examples(examples: &[ExampleData]) -> Self {
        let mut classes: BTreeMap<&str, BTreeMap<&str, &'static str>> = BTreeMap::new();
        for extraction in examples.iter().flat_map(|example| &example.extractions) {
            let attributes = classes
                .entry(extraction.extraction_class.as_str())
                .or_default();
            for (name, value) in extraction.attributes.iter().flatten() {
                let kind = if value.is_array() { "array" } else { "string" };
                // An array seen once keeps the attribute an array.
                let slot = attributes.entry(name.as_str()).or_insert(kind);
                if kind == "array" {
                    *slot = kind;
                }
            }
        }

        let mut properties = Map::new();
        for (class, attributes) in &classes {
            properties.insert((*class).to_string(), json!({ "type": "string" }));

            let attribute_properties: Map<String, Value> = attributes
                .iter()
                .map(|(name, kind)| {
                    let property = if *kind == "array" {
                        json!({ "type": "array", "items": { "type": "string" } })
                    } else {
                        json!({ "type": "string" })
                    };
                    ((*name).to_string(), property)
                })
                .collect();
            properties.insert(
                format!("{class}{ATTRIBUTE_SUFFIX}"),
                json!({
                    "type": "object",
                    "properties": attribute_properties,
                    "additionalProperties": false
                }),
            );
        }

        Self::new(json!({
            "type": "object",
            "properties": {
                EXTRACTIONS_KEY: {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": properties,
                        "additionalProperties": false
                    }
                }
            },
            "required": [EXTRACTIONS_KEY],
            "additionalProperties": false
        }))
    }

    /// The wrapped JSON Schema document.
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }
}

impl StructuredOutputSchema for AnthropicSchema {
    fn to_output_format(&self) -> OutputFormat {
        OutputFormat::json_schema(self.schema.clone())
    }
}
