//! Canonical conversation blocks.
//!
//! A [`ThreadBlock`] is one element of a conversation: user input, model
//! output, a thinking trace, a tool call with its result, or a server-side
//! web search / page view. Blocks are provider-neutral — adapters project
//! them into each provider's wire format on the way out and reconstruct
//! them incrementally on the way in.
//!
//! Serialization follows the snapshot wire shape: empty strings, empty
//! vectors and absent sub-records are elided, so a snapshot contains only
//! what the conversation actually holds.

use serde::{Deserialize, Serialize};

/// The closed set of block kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// System prompt text supplied by the caller.
    System,
    /// User input text supplied by the caller.
    Input,
    /// User-supplied image.
    InputImage,
    /// Model reasoning text, optionally signed by the provider.
    Thinking,
    /// Provider-encrypted reasoning blob; opaque to the engine.
    EncryptedThinking,
    /// Assistant output text.
    Text,
    /// A model-requested tool invocation plus (eventually) its result.
    ToolCall,
    /// A server-side web search performed by the provider.
    WebSearch,
    /// A server-side page fetch performed by the provider.
    ViewWebpage,
}

impl BlockKind {
    /// The snake_case name used on the wire and in generated block ids.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Input => "input",
            Self::InputImage => "input_image",
            Self::Thinking => "thinking",
            Self::EncryptedThinking => "encrypted_thinking",
            Self::Text => "text",
            Self::ToolCall => "tool_call",
            Self::WebSearch => "web_search",
            Self::ViewWebpage => "view_webpage",
        }
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model-requested tool invocation.
///
/// `arguments` holds the raw concatenation, in arrival order, of the
/// argument fragments the provider streamed. The engine never parses it;
/// the bytes may not form valid JSON until the call is fully streamed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Provider-assigned call id, echoed back in the result.
    pub id: String,
    /// The tool's registered name.
    pub name: String,
    /// Raw argument bytes as streamed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arguments: String,
}

/// The caller's reply to a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolResultRecord {
    /// The [`ToolCallRecord::id`] this result answers.
    pub tool_call_id: String,
    /// Handler output, forwarded verbatim to providers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output: String,
}

/// One result row of a server-side web search.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WebSearchResult {
    /// Page title.
    pub title: String,
    /// Page URL.
    pub url: String,
}

/// A server-side web search in progress or completed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WebSearchRecord {
    /// The query the model searched for.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query: String,
    /// Results returned by the provider.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<WebSearchResult>,
}

/// An inline image attached to an `input_image` block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Base64-encoded image bytes.
    pub base64: String,
    /// MIME type (e.g. `"image/png"`).
    pub media_type: String,
}

/// One element of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadBlock {
    /// Block identity. Unique within a thread when non-empty; `system`,
    /// `input` and `input_image` blocks carry an empty id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// What this block is.
    pub kind: BlockKind,
    /// Accumulated text (output, thinking, or a fetched page URL for
    /// `view_webpage` blocks).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Opaque provider token attached to thinking text.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub signature: String,
    /// Present on `tool_call` blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallRecord>,
    /// Attached once the caller's handler has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<ToolResultRecord>,
    /// Present on `web_search` blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_search: Option<WebSearchRecord>,
    /// Present on `input_image` blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRecord>,
    /// Set exactly once, when the block's lifecycle ends.
    #[serde(default)]
    pub complete: bool,
    /// Set on a block whose successor is a logical continuation of the
    /// same output (see the coalescing rule on
    /// [`Thread::text`](crate::Thread::text)).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continued: bool,
    /// Citation URLs attached to assistant text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
    /// Name of the adapter that produced this block. Thinking blocks with
    /// a foreign `provider_id` are skipped on replay.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub provider_id: String,
}

impl ThreadBlock {
    /// An empty block of the given kind and id.
    pub fn new(id: impl Into<String>, kind: BlockKind) -> Self {
        Self {
            id: id.into(),
            kind,
            text: String::new(),
            signature: String::new(),
            tool_call: None,
            tool_result: None,
            web_search: None,
            image: None,
            complete: false,
            continued: false,
            citations: Vec::new(),
            provider_id: String::new(),
        }
    }
}
