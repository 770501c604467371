//! Wire types for the Messages API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;
use threadkit::JsonSchema;

// ── Request ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct MessagesRequest {
    pub model: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub system: String,
    pub messages: Vec<MessagesMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    pub max_tokens: u32,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_format: Option<OutputFormat>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MessagesMessage {
    pub role: &'static str,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    Image {
        source: ImageSource,
    },
    Thinking {
        thinking: String,
        signature: String,
    },
    RedactedThinking {
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Value,
    },
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CacheControl {
    #[serde(rename = "type")]
    pub control_type: &'static str,
}

impl CacheControl {
    pub(crate) fn ephemeral() -> Self {
        Self {
            control_type: "ephemeral",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub media_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ThinkingConfig {
    #[serde(rename = "type")]
    pub config_type: &'static str,
    pub budget_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OutputFormat {
    #[serde(rename = "type")]
    pub format_type: &'static str,
    pub schema: JsonSchema,
}

// ── Stream events ────────────────────────────────────────────────────

/// One SSE payload. Fields are sparse; the handler switches on
/// `event_type` and reads only what that event carries.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamEnvelope {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub message: Option<StartMessage>,
    #[serde(default)]
    pub content_block: Option<StartContentBlock>,
    #[serde(default)]
    pub delta: Option<Delta>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StartMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct StartContentBlock {
    #[serde(rename = "type", default)]
    pub block_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub input: Option<Box<RawValue>>,
    #[serde(default)]
    pub tool_use_id: String,
    #[serde(default)]
    pub content: Vec<SearchResultRow>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SearchResultRow {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Delta {
    #[serde(rename = "type", default)]
    pub delta_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub partial_json: String,
    #[serde(default)]
    pub citation: Option<Citation>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Citation {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    pub error: WireError,
}

/// Arguments a server tool streams via `input_json_delta`; parsed once
/// the buffered fragments form valid JSON.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ServerToolInput {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub url: String,
}
