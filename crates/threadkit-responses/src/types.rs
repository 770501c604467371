//! Wire types for the Responses API.

use serde::{Deserialize, Serialize};
use threadkit::JsonSchema;

// ── Request ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct ResponsesRequest {
    pub model: String,
    pub input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSpec>,
    pub stream: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instructions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextConfig>,
}

/// One entry of the `input` list. The Responses API mixes role messages
/// with typed items in one array, so every field is optional and elided
/// when unset.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct InputItem {
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub item_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub call_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub arguments: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct ContentPart {
    #[serde(rename = "type")]
    pub part_type: &'static str,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image_url: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct ToolSpec {
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct Reasoning {
    pub effort: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TextConfig {
    pub format: TextFormat,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TextFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
    pub name: String,
    pub schema: JsonSchema,
    pub strict: bool,
}

// ── Stream events ────────────────────────────────────────────────────

/// A partial view of the streaming payloads; handlers switch on `type`
/// and read only the fields that event carries.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub delta: String,
    #[serde(default)]
    pub annotation: Option<Annotation>,
    #[serde(default)]
    pub item: Option<OutputItem>,
    #[serde(default)]
    pub response: Option<ResponseResult>,
    #[serde(default)]
    pub error: Option<StreamError>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Annotation {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OutputItem {
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub call_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
    #[serde(default)]
    pub action: Option<WebSearchAction>,
    #[serde(default)]
    pub summary: Vec<SummaryPart>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WebSearchAction {
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SummaryPart {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseResult {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub usage: Option<ResponseUsage>,
    #[serde(default)]
    pub error: Option<StreamError>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub input_tokens_details: InputTokensDetails,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InputTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
}
