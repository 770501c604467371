//! Tool descriptors and the JSON-Schema-like parameter tree.
//!
//! The engine never evaluates schemas. It serializes them verbatim to
//! providers and hands tool arguments back to the caller as opaque text.
//! [`JsonSchema`] therefore carries the union of fields any provider's
//! schema dialect needs, and nothing else.
//!
//! Property order is preserved through serialization round-trips
//! ([`IndexMap`] keeps insertion order); the wire does not care, but a
//! schema that survives a save/load cycle should read the same.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the model may invoke during generation.
///
/// Adapters translate this into their native tool object; the key under
/// which it is registered on the [`Thread`](crate::Thread) is the tool's
/// name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Shown to the model so it knows when to use this tool.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Schema of the tool's expected input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonSchema>,
}

/// The value of `additionalProperties`: a plain boolean or a nested schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalProperties {
    /// `true` / `false`.
    Allowed(bool),
    /// A schema constraining unnamed properties.
    Schema(Box<JsonSchema>),
}

/// A JSON-Schema-like parameter tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JsonSchema {
    /// The `type` keyword (`"object"`, `"string"`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub schema_type: String,
    /// The `description` keyword.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Named properties of an object, in declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, JsonSchema>>,
    /// Element schema of an array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    /// Required property names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Allowed literal values.
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// The `oneOf` composite.
    #[serde(rename = "oneOf", default, skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<JsonSchema>>,
    /// The `anyOf` composite.
    #[serde(rename = "anyOf", default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<JsonSchema>>,
    /// The `allOf` composite.
    #[serde(rename = "allOf", default, skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<JsonSchema>>,
    /// The `additionalProperties` keyword: boolean, absent, or a schema.
    #[serde(
        rename = "additionalProperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<AdditionalProperties>,
}

impl JsonSchema {
    /// A bare schema of the given `type`.
    pub fn of_type(schema_type: impl Into<String>) -> Self {
        Self {
            schema_type: schema_type.into(),
            ..Default::default()
        }
    }

    fn is_object(&self) -> bool {
        self.schema_type == "object"
    }
}

/// A structured-output request attached to a [`Thread`](crate::Thread).
///
/// Adapters translate this into their native response-format field,
/// running the schema through [`prepare_structured_output_schema`] with
/// the dialect flags their provider requires.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredOutputFormat {
    /// Format name forwarded to providers that require one.
    pub name: String,
    /// The schema the model's output must conform to.
    pub schema: JsonSchema,
    /// Request strict schema adherence where the provider supports it.
    #[serde(default)]
    pub strict: bool,
}

/// Deep-copies `schema`, rewriting `additionalProperties` for a provider's
/// structured-output dialect.
///
/// - When `allow_additional_properties` is `false`, the keyword is
///   stripped from every node (Google's `responseSchema` rejects it).
/// - Otherwise, when `strict` is `true`, every `object` node that leaves
///   the keyword unset gets an explicit `false` (OpenAI strict mode
///   requires it).
/// - A nested schema under `additionalProperties` is itself rewritten and
///   kept, in either mode.
///
/// Composites (`oneOf`/`anyOf`/`allOf`), `items` and `properties` are
/// recursed identically. Empty collections stay empty rather than being
/// elided.
pub fn prepare_structured_output_schema(
    schema: &JsonSchema,
    strict: bool,
    allow_additional_properties: bool,
) -> JsonSchema {
    let mut out = schema.clone();
    rewrite(&mut out, strict, allow_additional_properties);
    out
}

fn rewrite(node: &mut JsonSchema, strict: bool, allow: bool) {
    if let Some(props) = &mut node.properties {
        for child in props.values_mut() {
            rewrite(child, strict, allow);
        }
    }
    if let Some(items) = &mut node.items {
        rewrite(items, strict, allow);
    }
    for composite in [&mut node.one_of, &mut node.any_of, &mut node.all_of] {
        if let Some(schemas) = composite {
            for child in schemas.iter_mut() {
                rewrite(child, strict, allow);
            }
        }
    }

    match node.additional_properties.take() {
        // Nested schemas are rewritten and kept regardless of `allow`.
        Some(AdditionalProperties::Schema(mut inner)) => {
            rewrite(&mut inner, strict, allow);
            node.additional_properties = Some(AdditionalProperties::Schema(inner));
        }
        Some(AdditionalProperties::Allowed(value)) => {
            if allow {
                node.additional_properties = Some(AdditionalProperties::Allowed(value));
            }
        }
        None => {
            if allow && strict && node.is_object() {
                node.additional_properties = Some(AdditionalProperties::Allowed(false));
            }
        }
    }
}
