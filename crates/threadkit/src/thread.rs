//! The conversation: an ordered block list plus configuration and
//! execution state.
//!
//! [`Thread`] is the single mutable surface shared by the caller, the
//! session driver and the provider adapters. Adapters reconstruct blocks
//! through the mutators here as stream events arrive; the driver watches
//! the private `updated` edge-trigger to deliver partial-update callbacks
//! without flooding the caller once per wire fragment.
//!
//! # Identity and find-or-create
//!
//! Streamed fragments address blocks by `(id, kind)`. Lookup is a
//! **reverse scan** from the tail of the block list — first match wins —
//! so an older block of the same kind with a different id can never
//! capture a later fragment. On a miss a new block is appended (subject
//! to the text-coalescing rule below).
//!
//! # Persistence
//!
//! A `Thread` is not serialized directly. [`Thread::snapshot`] captures
//! the block list only; configuration (model, tools, reasoning, handler)
//! and execution results (success, error, usage) are code-defined and are
//! deliberately not part of a snapshot — restoring a conversation into a
//! different model or provider is a supported use case.

use std::fmt;

use base64::Engine as _;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::block::{
    BlockKind, ImageRecord, ThreadBlock, ToolCallRecord, ToolResultRecord, WebSearchRecord,
    WebSearchResult,
};
use crate::error::AiError;
use crate::tool::{StructuredOutputFormat, ToolDefinition};

/// Reasoning configuration for providers that support it.
///
/// Exactly one of the two shapes is meaningful for any given provider:
/// OpenAI-style APIs take a discrete effort level, Anthropic- and
/// Google-style APIs take a thinking-token budget. Adapters pick the
/// variant they understand and ignore the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningConfig {
    /// Discrete effort level (`"low"`, `"medium"`, `"high"`, ...).
    Effort(String),
    /// Thinking-token budget.
    Budget(u32),
}

/// Token and server-tool usage accumulated across the turns of a stream.
///
/// `input_tokens` counts non-cached input only; cached reads and writes
/// are tracked separately so the caller's billing arithmetic stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThreadUsage {
    /// Non-cached input tokens.
    pub input_tokens: u64,
    /// Output tokens.
    pub output_tokens: u64,
    /// Tokens served from the provider's prompt cache.
    pub cache_read_tokens: u64,
    /// Tokens written into the provider's prompt cache.
    pub cache_write_tokens: u64,
    /// Server-side web searches performed.
    pub web_searches: u32,
    /// Server-side page views performed.
    pub page_views: u32,
}

/// The serializable projection of a [`Thread`]: its block list only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// The conversation blocks at the time of the snapshot.
    pub blocks: Vec<ThreadBlock>,
}

/// Synchronous tool handler: `(tool_name, arguments_json_text) -> result`.
///
/// Arguments are the exact concatenated bytes streamed by the provider;
/// parsing them is the handler's responsibility. The result is forwarded
/// verbatim (Google wraps non-object results as `{"output": …}`).
pub type ToolHandler = Box<dyn Fn(&str, &str) -> String + Send + Sync>;

/// An inference conversation with configuration and execution state.
#[derive(Default)]
pub struct Thread {
    /// Model identifier sent to the provider.
    pub model: String,
    /// Reasoning configuration, if any.
    pub reasoning: Option<ReasoningConfig>,
    /// Tools the model may invoke, keyed by name.
    pub tools: IndexMap<String, ToolDefinition>,
    /// Ceiling for server-side web searches (0 disables the tool).
    pub max_web_searches: u32,
    /// Enables the provider's server-side web-fetch tool.
    pub web_fetch_enabled: bool,
    /// Structured-output request, if any.
    pub structured_output: Option<StructuredOutputFormat>,
    /// Raise the update flag when blocks are finalized, not only when
    /// text arrives.
    pub update_on_finalize: bool,
    /// Mark the predecessor `continued` and start a fresh block when a
    /// new text id arrives directly after another text block.
    pub coalesce_text_blocks: bool,

    /// Whether the last stream completed successfully.
    pub success: bool,
    /// Rendered error of the last stream, if it failed.
    pub error: Option<String>,
    /// Usage accumulated by the last stream.
    pub usage: ThreadUsage,

    /// Conversation id, assigned by whichever provider first returns one.
    pub thread_id: String,
    /// Name of the adapter currently attached; stamped onto blocks
    /// produced in this turn.
    pub current_provider: String,

    /// The ordered conversation.
    pub blocks: Vec<ThreadBlock>,

    tool_handler: Option<ToolHandler>,
    updated: bool,
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("model", &self.model)
            .field("reasoning", &self.reasoning)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("success", &self.success)
            .field("error", &self.error)
            .field("usage", &self.usage)
            .field("thread_id", &self.thread_id)
            .field("current_provider", &self.current_provider)
            .field("blocks", &self.blocks)
            .field("tool_handler", &self.tool_handler.as_ref().map(|_| "..."))
            .finish()
    }
}

impl Thread {
    /// An empty thread. Configure it with struct-field assignment and
    /// [`set_tool_handler`](Self::set_tool_handler), then hand it to a
    /// [`Session`](crate::Session).
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs the tool handler invoked by the session driver.
    pub fn set_tool_handler(
        &mut self,
        handler: impl Fn(&str, &str) -> String + Send + Sync + 'static,
    ) {
        self.tool_handler = Some(Box::new(handler));
    }

    /// Invokes the tool handler, or returns `None` if none is installed.
    pub fn handle_tool(&self, name: &str, arguments: &str) -> Option<String> {
        self.tool_handler.as_ref().map(|h| h(name, arguments))
    }

    /// Returns the update flag and clears it, in one step.
    ///
    /// The flag is an edge trigger: it is raised by every block-mutating
    /// method and collapses any number of mutations between observations
    /// into a single `true`.
    pub fn take_update(&mut self) -> bool {
        std::mem::take(&mut self.updated)
    }

    /// Records a failure: clears `success` and stores the rendered error.
    pub fn set_error(&mut self, err: &AiError) {
        self.error = Some(err.to_string());
        self.success = false;
    }

    /// Counts tool-call blocks that have not completed yet.
    pub fn incomplete_tool_calls(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.kind == BlockKind::ToolCall && !b.complete)
            .count()
    }

    /// Captures a copy of the block list.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            blocks: self.blocks.clone(),
        }
    }

    /// Replaces the block list with a copy of the snapshot's. Execution
    /// state (success, error, usage, thread id) is untouched.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.blocks = snapshot.blocks.clone();
    }

    /// A fresh block id of the form `"<kind>-<N+1>"`, for chunks that
    /// arrive without a provider-supplied id.
    pub fn new_block_id(&self, kind: BlockKind) -> String {
        format!("{}-{}", kind, self.blocks.len() + 1)
    }

    /// Marks every block whose id equals `id` complete.
    pub fn complete(&mut self, id: &str) {
        for block in &mut self.blocks {
            if block.id == id {
                block.complete = true;
                if self.update_on_finalize {
                    self.updated = true;
                }
            }
        }
    }

    fn create(&mut self, id: impl Into<String>, kind: BlockKind) -> usize {
        let mut block = ThreadBlock::new(id, kind);
        block.provider_id = self.current_provider.clone();
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    /// Reverse scan by `(id, kind)`; first match from the tail wins.
    fn find(&self, id: &str, kind: BlockKind) -> Option<usize> {
        self.blocks
            .iter()
            .rposition(|b| b.kind == kind && b.id == id)
    }

    fn find_or_create(&mut self, id: &str, kind: BlockKind) -> usize {
        if let Some(idx) = self.find(id, kind) {
            return idx;
        }
        if self.coalesce_text_blocks && kind == BlockKind::Text {
            if let Some(last) = self.blocks.last_mut() {
                if last.kind == BlockKind::Text {
                    last.continued = true;
                }
            }
        }
        self.create(id, kind)
    }

    /// Appends a completed `system` block.
    pub fn system(&mut self, text: impl Into<String>) {
        let idx = self.create("", BlockKind::System);
        self.blocks[idx].text = text.into();
        self.blocks[idx].complete = true;
        self.updated = true;
    }

    /// Appends a completed `input` block.
    pub fn input(&mut self, text: impl Into<String>) {
        let idx = self.create("", BlockKind::Input);
        self.blocks[idx].text = text.into();
        self.blocks[idx].complete = true;
        self.updated = true;
    }

    /// Appends an `input_image` block from raw bytes; the bytes are
    /// base64-encoded immediately. `media_type` is a MIME type such as
    /// `"image/png"`.
    pub fn input_image(&mut self, data: &[u8], media_type: impl Into<String>) {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        self.input_image_base64(encoded, media_type);
    }

    /// Appends an `input_image` block from a pre-encoded base64 string.
    pub fn input_image_base64(&mut self, base64: impl Into<String>, media_type: impl Into<String>) {
        let idx = self.create("", BlockKind::InputImage);
        self.blocks[idx].image = Some(ImageRecord {
            base64: base64.into(),
            media_type: media_type.into(),
        });
        self.blocks[idx].complete = true;
        self.updated = true;
    }

    /// Appends `chunk` to the `text` block with the given id, creating it
    /// if absent. Empty chunks are ignored.
    pub fn text(&mut self, id: &str, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let idx = self.find_or_create(id, BlockKind::Text);
        self.blocks[idx].text.push_str(chunk);
        self.updated = true;
    }

    /// Appends a citation URL to the `text` block with the given id,
    /// creating it if absent.
    pub fn cite(&mut self, id: &str, url: impl Into<String>) {
        let idx = self.find_or_create(id, BlockKind::Text);
        self.blocks[idx].citations.push(url.into());
        self.updated = true;
    }

    /// Appends `chunk` to the `thinking` block with the given id,
    /// creating it if absent. Empty chunks are ignored.
    pub fn thinking(&mut self, id: &str, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        let idx = self.find_or_create(id, BlockKind::Thinking);
        self.blocks[idx].text.push_str(chunk);
        self.updated = true;
    }

    /// Appends a signature fragment to the `thinking` block with the
    /// given id, creating it if absent. Empty fragments are ignored.
    pub fn thinking_signature(&mut self, id: &str, signature: &str) {
        if signature.is_empty() {
            return;
        }
        let idx = self.find_or_create(id, BlockKind::Thinking);
        self.blocks[idx].signature.push_str(signature);
        self.updated = true;
    }

    /// Appends thinking text and a signature fragment in one step. A call
    /// with both parts empty is ignored.
    pub fn thinking_with_signature(&mut self, id: &str, text: &str, signature: &str) {
        if text.is_empty() && signature.is_empty() {
            return;
        }
        let idx = self.find_or_create(id, BlockKind::Thinking);
        self.blocks[idx].text.push_str(text);
        self.blocks[idx].signature.push_str(signature);
        self.updated = true;
    }

    /// Appends an unidentified `encrypted_thinking` block holding an
    /// opaque provider blob.
    pub fn encrypted_thinking(&mut self, data: impl Into<String>) {
        let idx = self.create("", BlockKind::EncryptedThinking);
        self.blocks[idx].text.push_str(&data.into());
        self.updated = true;
    }

    /// Starts or extends a `tool_call` block.
    ///
    /// If no block with this id exists, one is appended carrying the call
    /// record. If the block exists without a record yet, the record is
    /// attached. Otherwise `arguments` is concatenated onto the existing
    /// argument text; an empty `name` means "keep the prior name".
    pub fn tool_call(&mut self, id: &str, name: &str, arguments: &str) {
        match self.find(id, BlockKind::ToolCall) {
            None => {
                let idx = self.create(id, BlockKind::ToolCall);
                self.blocks[idx].tool_call = Some(ToolCallRecord {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                });
                self.updated = true;
            }
            Some(idx) => match &mut self.blocks[idx].tool_call {
                None => {
                    self.blocks[idx].tool_call = Some(ToolCallRecord {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: arguments.to_string(),
                    });
                    self.updated = true;
                }
                Some(call) => {
                    if !arguments.is_empty() {
                        call.arguments.push_str(arguments);
                        self.updated = true;
                    }
                }
            },
        }
    }

    /// Starts or extends a `tool_call` block that carries thinking text
    /// and an opaque signature alongside the call (Google pins a
    /// `thoughtSignature` to function calls; it must be replayed with
    /// them).
    pub fn tool_call_with_thinking(
        &mut self,
        id: &str,
        name: &str,
        arguments: &str,
        thinking: &str,
        signature: &str,
    ) {
        let idx = match self.find(id, BlockKind::ToolCall) {
            Some(idx) => idx,
            None => self.create(id, BlockKind::ToolCall),
        };
        match &mut self.blocks[idx].tool_call {
            None => {
                self.blocks[idx].tool_call = Some(ToolCallRecord {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                });
            }
            Some(call) => call.arguments.push_str(arguments),
        }
        self.blocks[idx].text = thinking.to_string();
        self.blocks[idx].signature = signature.to_string();
        self.updated = true;
    }

    /// Attaches the handler's output to the matching `tool_call` block
    /// and marks it complete.
    pub fn tool_result(&mut self, tool_call: &ToolCallRecord, output: impl Into<String>) {
        let Some(idx) = self.find(&tool_call.id, BlockKind::ToolCall) else {
            return;
        };
        self.blocks[idx].tool_result = Some(ToolResultRecord {
            tool_call_id: tool_call.id.clone(),
            output: output.into(),
        });
        self.blocks[idx].complete = true;
        self.updated = true;
    }

    /// Begins a `web_search` block with an empty result list.
    pub fn web_search(&mut self, id: &str) {
        let idx = self.find_or_create(id, BlockKind::WebSearch);
        self.blocks[idx].web_search = Some(WebSearchRecord {
            query: String::new(),
            results: Vec::new(),
        });
        self.updated = true;
    }

    /// Records the query of a `web_search` block and completes it.
    pub fn web_search_query(&mut self, id: &str, query: impl Into<String>) {
        let idx = self.find_or_create(id, BlockKind::WebSearch);
        let record = self.blocks[idx].web_search.get_or_insert_with(Default::default);
        record.query = query.into();
        self.complete_web_search(id);
    }

    /// Appends one result row to a `web_search` block.
    pub fn web_search_result(&mut self, id: &str, result: WebSearchResult) {
        let idx = self.find_or_create(id, BlockKind::WebSearch);
        self.blocks[idx]
            .web_search
            .get_or_insert_with(Default::default)
            .results
            .push(result);
        self.updated = true;
    }

    /// Completes a `web_search` block and counts the search in
    /// [`ThreadUsage::web_searches`].
    pub fn complete_web_search(&mut self, id: &str) {
        let idx = self.find_or_create(id, BlockKind::WebSearch);
        self.blocks[idx].complete = true;
        self.usage.web_searches += 1;
        self.updated = true;
    }

    /// Begins a `view_webpage` block.
    pub fn view_webpage(&mut self, id: &str) {
        let idx = self.find_or_create(id, BlockKind::ViewWebpage);
        self.blocks[idx].complete = false;
    }

    /// Records the fetched URL on a `view_webpage` block, completes it,
    /// and counts the view in [`ThreadUsage::page_views`].
    pub fn view_webpage_url(&mut self, id: &str, url: impl Into<String>) {
        let idx = self.find_or_create(id, BlockKind::ViewWebpage);
        self.blocks[idx].text = url.into();
        self.blocks[idx].complete = true;
        self.usage.page_views += 1;
        self.updated = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_find_or_create_appends() {
        let mut thread = Thread::new();
        thread.text("text_1", "Hello");
        thread.text("text_1", " World");

        assert_eq!(thread.blocks.len(), 1);
        assert_eq!(thread.blocks[0].text, "Hello World");
    }

    #[test]
    fn test_text_empty_chunk_ignored() {
        let mut thread = Thread::new();
        thread.text("text_1", "");
        assert!(thread.blocks.is_empty());
        assert!(!thread.take_update());
    }

    #[test]
    fn test_reverse_scan_prefers_newest_block() {
        // An older block of the same kind with a different id must not
        // capture later fragments.
        let mut thread = Thread::new();
        thread.text("a", "first");
        thread.text("b", "second");
        thread.text("b", " more");

        assert_eq!(thread.blocks.len(), 2);
        assert_eq!(thread.blocks[0].text, "first");
        assert_eq!(thread.blocks[1].text, "second more");
    }

    #[test]
    fn test_reverse_scan_matches_kind_and_id() {
        let mut thread = Thread::new();
        thread.text("shared", "text body");
        thread.thinking("shared", "thinking body");

        assert_eq!(thread.blocks.len(), 2);
        assert_eq!(thread.blocks[0].kind, BlockKind::Text);
        assert_eq!(thread.blocks[1].kind, BlockKind::Thinking);
    }

    #[test]
    fn test_coalesce_marks_predecessor_continued() {
        let mut thread = Thread::new();
        thread.coalesce_text_blocks = true;
        thread.text("a", "Hello");
        thread.text("b", " World");
        thread.text("c", "!");

        let continued: Vec<_> = thread.blocks.iter().map(|b| b.continued).collect();
        assert_eq!(continued, vec![true, true, false]);
        let texts: Vec<_> = thread.blocks.iter().map(|b| b.text.clone()).collect();
        assert_eq!(texts, vec!["Hello", " World", "!"]);
    }

    #[test]
    fn test_coalesce_broken_by_intervening_block() {
        let mut thread = Thread::new();
        thread.coalesce_text_blocks = true;
        thread.text("a", "Hello");
        thread.tool_call("call_1", "lookup", "{}");
        thread.text("b", " World");

        assert!(!thread.blocks[0].continued);
        assert!(!thread.blocks[2].continued);
    }

    #[test]
    fn test_coalesce_off_creates_plain_blocks() {
        let mut thread = Thread::new();
        thread.text("a", "Hello");
        thread.text("b", " World");
        assert!(thread.blocks.iter().all(|b| !b.continued));
    }

    #[test]
    fn test_tool_call_argument_accumulation() {
        let mut thread = Thread::new();
        thread.tool_call("call_1", "get_weather", "");
        thread.tool_call("call_1", "", "{\"location\":");
        thread.tool_call("call_1", "", " \"Paris\"}");

        assert_eq!(thread.blocks.len(), 1);
        let call = thread.blocks[0].tool_call.as_ref().unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments, "{\"location\": \"Paris\"}");
        assert!(!thread.blocks[0].complete);
    }

    #[test]
    fn test_tool_call_empty_append_is_noop() {
        let mut thread = Thread::new();
        thread.tool_call("call_1", "tool", "{}");
        thread.take_update();
        thread.tool_call("call_1", "", "");
        assert!(!thread.take_update());
    }

    #[test]
    fn test_tool_result_completes_call() {
        let mut thread = Thread::new();
        thread.tool_call("call_1", "tool", "{\"x\":1}");
        assert_eq!(thread.incomplete_tool_calls(), 1);

        let call = thread.blocks[0].tool_call.clone().unwrap();
        thread.tool_result(&call, "done");

        let block = &thread.blocks[0];
        assert!(block.complete);
        let result = block.tool_result.as_ref().unwrap();
        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.output, "done");
        assert_eq!(thread.incomplete_tool_calls(), 0);
    }

    #[test]
    fn test_incomplete_tool_calls_counter() {
        let mut thread = Thread::new();
        assert_eq!(thread.incomplete_tool_calls(), 0);

        thread.tool_call("call_1", "tool_a", "");
        thread.tool_call("call_2", "tool_b", "");
        assert_eq!(thread.incomplete_tool_calls(), 2);

        // Appending arguments must not change the count.
        thread.tool_call("call_1", "", "{\"more\":\"args\"}");
        assert_eq!(thread.incomplete_tool_calls(), 2);

        let first = thread.blocks[0].tool_call.clone().unwrap();
        thread.tool_result(&first, "r1");
        assert_eq!(thread.incomplete_tool_calls(), 1);

        let second = thread.blocks[1].tool_call.clone().unwrap();
        thread.tool_result(&second, "r2");
        assert_eq!(thread.incomplete_tool_calls(), 0);
    }

    #[test]
    fn test_tool_call_with_thinking_pins_signature() {
        let mut thread = Thread::new();
        thread.tool_call_with_thinking("tool_call-1", "get_weather", "{\"q\":1}", "", "sig_abc");
        let block = &thread.blocks[0];
        assert_eq!(block.signature, "sig_abc");
        assert_eq!(block.tool_call.as_ref().unwrap().name, "get_weather");
    }

    #[test]
    fn test_complete_marks_every_matching_block() {
        let mut thread = Thread::new();
        thread.text("shared", "a");
        thread.thinking("shared", "b");
        thread.complete("shared");
        assert!(thread.blocks.iter().all(|b| b.complete));
    }

    #[test]
    fn test_complete_raises_update_only_on_finalize_flag() {
        let mut thread = Thread::new();
        thread.text("t", "x");
        thread.take_update();
        thread.complete("t");
        assert!(!thread.take_update());

        thread.update_on_finalize = true;
        thread.complete("t");
        assert!(thread.take_update());
    }

    #[test]
    fn test_take_update_edge_trigger() {
        let mut thread = Thread::new();
        thread.text("t", "a");
        thread.text("t", "b");
        assert!(thread.take_update());
        assert!(!thread.take_update());
    }

    #[test]
    fn test_thinking_text_and_signature_append() {
        let mut thread = Thread::new();
        thread.thinking("th", "step one ");
        thread.thinking("th", "step two");
        thread.thinking_signature("th", "sig-");
        thread.thinking_signature("th", "tail");

        assert_eq!(thread.blocks.len(), 1);
        assert_eq!(thread.blocks[0].text, "step one step two");
        assert_eq!(thread.blocks[0].signature, "sig-tail");
    }

    #[test]
    fn test_thinking_with_signature_both_empty_ignored() {
        let mut thread = Thread::new();
        thread.thinking_with_signature("th", "", "");
        assert!(thread.blocks.is_empty());
    }

    #[test]
    fn test_encrypted_thinking_appends_unidentified_block() {
        let mut thread = Thread::new();
        thread.encrypted_thinking("opaque-blob");
        assert_eq!(thread.blocks[0].kind, BlockKind::EncryptedThinking);
        assert!(thread.blocks[0].id.is_empty());
        assert_eq!(thread.blocks[0].text, "opaque-blob");
        assert!(thread.take_update());
    }

    #[test]
    fn test_blocks_stamped_with_current_provider() {
        let mut thread = Thread::new();
        thread.current_provider = "messages.anthropic".into();
        thread.thinking("th", "x");
        assert_eq!(thread.blocks[0].provider_id, "messages.anthropic");
    }

    #[test]
    fn test_cite_creates_text_block_on_miss() {
        let mut thread = Thread::new();
        thread.cite("msg.0", "https://example.com/a");
        thread.text("msg.0", "body");
        thread.cite("msg.0", "https://example.com/b");

        assert_eq!(thread.blocks.len(), 1);
        assert_eq!(
            thread.blocks[0].citations,
            vec!["https://example.com/a", "https://example.com/b"]
        );
    }

    #[test]
    fn test_web_search_lifecycle() {
        let mut thread = Thread::new();
        thread.web_search("srv_1");
        thread.web_search_result(
            "srv_1",
            WebSearchResult {
                title: "Rust".into(),
                url: "https://rust-lang.org".into(),
            },
        );
        thread.complete_web_search("srv_1");

        let block = &thread.blocks[0];
        assert!(block.complete);
        assert_eq!(block.web_search.as_ref().unwrap().results.len(), 1);
        assert_eq!(thread.usage.web_searches, 1);
    }

    #[test]
    fn test_web_search_query_auto_completes() {
        let mut thread = Thread::new();
        thread.web_search_query("srv_1", "rust streaming");
        let block = &thread.blocks[0];
        assert!(block.complete);
        assert_eq!(block.web_search.as_ref().unwrap().query, "rust streaming");
        assert_eq!(thread.usage.web_searches, 1);
    }

    #[test]
    fn test_view_webpage_lifecycle() {
        let mut thread = Thread::new();
        thread.view_webpage("fetch_1");
        assert!(!thread.blocks[0].complete);
        thread.view_webpage_url("fetch_1", "https://example.com");
        assert!(thread.blocks[0].complete);
        assert_eq!(thread.blocks[0].text, "https://example.com");
        assert_eq!(thread.usage.page_views, 1);
    }

    #[test]
    fn test_input_image_encodes_bytes() {
        let mut thread = Thread::new();
        thread.input_image(&[0xFF, 0xD8, 0xFF], "image/jpeg");
        let image = thread.blocks[0].image.as_ref().unwrap();
        assert_eq!(image.base64, "/9j/");
        assert_eq!(image.media_type, "image/jpeg");
        assert!(thread.blocks[0].complete);
    }

    #[test]
    fn test_system_input_complete_with_empty_ids() {
        let mut thread = Thread::new();
        thread.system("be terse");
        thread.input("hello");
        assert!(thread.blocks.iter().all(|b| b.complete && b.id.is_empty()));
        assert_eq!(thread.blocks[0].kind, BlockKind::System);
        assert_eq!(thread.blocks[1].kind, BlockKind::Input);
    }

    #[test]
    fn test_new_block_id_unique_as_blocks_grow() {
        let mut thread = Thread::new();
        let id1 = thread.new_block_id(BlockKind::Text);
        thread.text(&id1, "First");
        let id2 = thread.new_block_id(BlockKind::Text);
        assert_ne!(id1, id2);
        assert_eq!(id1, "text-1");
        assert_eq!(id2, "text-2");
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut thread = Thread::new();
        thread.current_provider = "messages.anthropic".into();
        thread.system("sys");
        thread.input("hi");
        thread.thinking("th.0", "hmm");
        thread.text("msg.0", "Hello");
        thread.tool_call("call_1", "lookup", "{\"x\":1}");
        let call = thread.blocks.last().unwrap().tool_call.clone().unwrap();
        thread.tool_result(&call, "found");

        let snapshot = thread.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();

        let mut restored = Thread::new();
        restored.success = true;
        restored.thread_id = "keep-me".into();
        restored.restore(&parsed);

        assert_eq!(restored.blocks, thread.blocks);
        // Execution state is not part of a snapshot.
        assert!(restored.success);
        assert_eq!(restored.thread_id, "keep-me");
    }

    #[test]
    fn test_set_error_records_rendered_string() {
        let mut thread = Thread::new();
        thread.success = true;
        thread.set_error(&AiError::rate_limit("messages.anthropic", "slow down"));
        assert!(!thread.success);
        assert_eq!(
            thread.error.as_deref(),
            Some("[messages.anthropic] rate_limit: slow down")
        );
    }

    #[test]
    fn test_nonempty_ids_unique() {
        let mut thread = Thread::new();
        thread.system("s");
        thread.input("i");
        thread.text("t1", "a");
        thread.thinking("th1", "b");
        thread.tool_call("c1", "tool", "");

        let mut seen = std::collections::HashSet::new();
        for block in thread.blocks.iter().filter(|b| !b.id.is_empty()) {
            assert!(seen.insert(block.id.clone()), "duplicate id {}", block.id);
        }
    }

    #[test]
    fn test_handle_tool_without_handler() {
        let thread = Thread::new();
        assert!(thread.handle_tool("x", "{}").is_none());
    }

    #[test]
    fn test_handle_tool_invokes_handler() {
        let mut thread = Thread::new();
        thread.set_tool_handler(|name, args| format!("{name}:{args}"));
        assert_eq!(
            thread.handle_tool("echo", "{\"a\":1}").as_deref(),
            Some("echo:{\"a\":1}")
        );
    }
}
