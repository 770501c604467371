//! The Messages (Anthropic-style) adapter.

use std::collections::HashMap;

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use threadkit::{
    Adapter, AiError, BlockKind, ChunkStatus, HttpRequest, ProviderConfig, ReasoningConfig, Thread,
    ThreadBlock, WebSearchResult, prepare_structured_output_schema,
};
use tracing::trace;

use crate::types::{
    CacheControl, ContentPart, ImageSource, MessagesMessage, MessagesRequest, OutputFormat,
    ServerToolInput, StartContentBlock, StreamEnvelope, ThinkingConfig, WireUsage,
};

/// Where the fragments streamed at one content-block index belong.
#[derive(Debug)]
enum StreamTarget {
    Text(String),
    Thinking(String),
    ToolCall(String),
    WebSearch { id: String, buffer: String },
    ViewWebpage { id: String, buffer: String },
    /// A block with no further fragment routing (redacted thinking,
    /// server tool results, unknown kinds).
    Opaque,
}

/// Adapter for the Anthropic-style Messages API.
///
/// Point [`ProviderConfig::endpoint`] at any Messages-compatible server;
/// the [`anthropic`](crate::anthropic) factory configures the real one.
#[derive(Debug)]
pub struct MessagesAdapter {
    /// Endpoint, key and server-tool labels.
    pub config: ProviderConfig,
    /// Value of the `anthropic-version` header.
    pub api_version: String,
    /// Beta feature names joined into the `anthropic-beta` header.
    pub beta_features: Vec<String>,
    /// `max_tokens` sent with every request.
    pub max_tokens: u32,

    name: String,
    request: MessagesRequest,
    targets: HashMap<u32, StreamTarget>,
}

impl MessagesAdapter {
    /// An adapter with the default API version and token ceiling.
    pub fn new(config: ProviderConfig) -> Self {
        let name = format!("messages.{}", config.name);
        Self {
            config,
            api_version: "2023-06-01".into(),
            beta_features: Vec::new(),
            max_tokens: 10_000,
            name,
            request: MessagesRequest::default(),
            targets: HashMap::new(),
        }
    }

    fn fold_usage(thread: &mut Thread, usage: &WireUsage) {
        let cached = usage.cache_read_input_tokens + usage.cache_creation_input_tokens;
        let result = &mut thread.usage;
        result.input_tokens += usage.input_tokens.saturating_sub(cached);
        result.cache_read_tokens += usage.cache_read_input_tokens;
        result.cache_write_tokens += usage.cache_creation_input_tokens;
        result.output_tokens += usage.output_tokens;
    }

    fn map_stream_error(&self, error_type: &str, message: &str) -> AiError {
        match error_type {
            "authentication_error" | "permission_error" => {
                AiError::authentication(&self.name, message)
            }
            "invalid_request_error" | "not_found_error" | "request_too_large" => {
                AiError::configuration(&self.name, message)
            }
            "rate_limit_error" | "rate_limit_exceeded" => AiError::rate_limit(&self.name, message),
            _ => AiError::unknown(&self.name, message),
        }
    }

    fn begin_content_block(&mut self, index: u32, block: &StartContentBlock, thread: &mut Thread) {
        let target = match block.block_type.as_str() {
            "text" => {
                let id = format!("{}.{}", thread.thread_id, index);
                thread.text(&id, &block.text);
                StreamTarget::Text(id)
            }
            "thinking" => {
                let id = format!("{}.{}", thread.thread_id, index);
                thread.thinking_with_signature(&id, &block.thinking, &block.signature);
                StreamTarget::Thinking(id)
            }
            "redacted_thinking" => {
                thread.encrypted_thinking(&block.data);
                StreamTarget::Opaque
            }
            "tool_use" => {
                let seed = match &block.input {
                    Some(raw) if raw.get() != "{}" && !raw.get().is_empty() => raw.get(),
                    _ => "",
                };
                thread.tool_call(&block.id, &block.name, seed);
                StreamTarget::ToolCall(block.id.clone())
            }
            "server_tool_use" => match block.name.as_str() {
                "web_search" => {
                    thread.web_search(&block.id);
                    StreamTarget::WebSearch {
                        id: block.id.clone(),
                        buffer: String::new(),
                    }
                }
                "web_fetch" => {
                    thread.view_webpage(&block.id);
                    StreamTarget::ViewWebpage {
                        id: block.id.clone(),
                        buffer: String::new(),
                    }
                }
                _ => StreamTarget::Opaque,
            },
            "web_search_tool_result" => {
                for row in &block.content {
                    thread.web_search_result(
                        &block.tool_use_id,
                        WebSearchResult {
                            title: row.title.clone(),
                            url: row.url.clone(),
                        },
                    );
                }
                // The search was counted when its query settled; count it
                // here only if the query never parsed.
                let mut uncounted = false;
                for target in self.targets.values_mut() {
                    let matches_search = matches!(
                        target,
                        StreamTarget::WebSearch { id, .. } if *id == block.tool_use_id
                    );
                    if matches_search {
                        *target = StreamTarget::Opaque;
                        uncounted = true;
                        break;
                    }
                }
                if uncounted {
                    thread.complete_web_search(&block.tool_use_id);
                } else {
                    thread.complete(&block.tool_use_id);
                }
                StreamTarget::Opaque
            }
            other => {
                trace!(block_type = other, "ignoring unknown content block kind");
                StreamTarget::Opaque
            }
        };
        self.targets.insert(index, target);
    }

    fn apply_delta(&mut self, index: u32, delta: &crate::types::Delta, thread: &mut Thread) {
        let Some(target) = self.targets.get_mut(&index) else {
            return;
        };
        match delta.delta_type.as_str() {
            "text_delta" => {
                if let StreamTarget::Text(id) = target {
                    let id = id.clone();
                    thread.text(&id, &delta.text);
                }
            }
            "citations_delta" => {
                if let StreamTarget::Text(id) = target {
                    if let Some(citation) = &delta.citation {
                        if !citation.url.is_empty() {
                            let id = id.clone();
                            thread.cite(&id, citation.url.clone());
                        }
                    }
                }
            }
            "thinking_delta" => {
                if let StreamTarget::Thinking(id) = target {
                    let id = id.clone();
                    thread.thinking(&id, &delta.thinking);
                }
            }
            "signature_delta" => {
                if let StreamTarget::Thinking(id) = target {
                    let id = id.clone();
                    thread.thinking_signature(&id, &delta.signature);
                }
            }
            "input_json_delta" => {
                let mut settled = false;
                match target {
                    StreamTarget::ToolCall(id) => {
                        let id = id.clone();
                        thread.tool_call(&id, "", &delta.partial_json);
                    }
                    StreamTarget::WebSearch { id, buffer } => {
                        buffer.push_str(&delta.partial_json);
                        if let Ok(input) = serde_json::from_str::<ServerToolInput>(buffer.as_str())
                        {
                            if !input.query.is_empty() {
                                let id = id.clone();
                                thread.web_search_query(&id, input.query);
                                settled = true;
                            }
                        }
                    }
                    StreamTarget::ViewWebpage { id, buffer } => {
                        buffer.push_str(&delta.partial_json);
                        if let Ok(input) = serde_json::from_str::<ServerToolInput>(buffer.as_str())
                        {
                            if !input.url.is_empty() {
                                let id = id.clone();
                                thread.view_webpage_url(&id, input.url);
                                settled = true;
                            }
                        }
                    }
                    _ => {}
                }
                if settled {
                    self.targets.insert(index, StreamTarget::Opaque);
                }
            }
            _ => {}
        }
    }
}

impl Adapter for MessagesAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_session(&mut self, thread: &Thread) {
        let mut tools = Vec::with_capacity(thread.tools.len() + 2);
        for (name, def) in &thread.tools {
            let input_schema = def
                .parameters
                .as_ref()
                .and_then(|p| serde_json::to_value(p).ok())
                .unwrap_or_else(|| serde_json::json!({"type": "object"}));
            tools.push(serde_json::json!({
                "name": name,
                "description": def.description,
                "input_schema": input_schema,
            }));
        }
        if !self.config.web_search_tool.is_empty() && thread.max_web_searches > 0 {
            tools.push(serde_json::json!({
                "type": self.config.web_search_tool,
                "name": "web_search",
                "max_uses": thread.max_web_searches,
            }));
        }
        if !self.config.web_fetch_tool.is_empty() && thread.web_fetch_enabled {
            tools.push(serde_json::json!({
                "type": self.config.web_fetch_tool,
                "name": "web_fetch",
            }));
        }

        let thinking = match &thread.reasoning {
            Some(ReasoningConfig::Budget(budget)) => Some(ThinkingConfig {
                config_type: "enabled",
                budget_tokens: *budget,
            }),
            _ => None,
        };
        let output_format = thread.structured_output.as_ref().map(|so| OutputFormat {
            format_type: "json_schema",
            schema: prepare_structured_output_schema(&so.schema, so.strict, true),
        });

        self.request = MessagesRequest {
            model: thread.model.clone(),
            system: String::new(),
            messages: Vec::new(),
            tools,
            max_tokens: self.max_tokens,
            stream: true,
            thinking,
            output_format,
        };
    }

    fn prepare_for_updates(&mut self) {
        // The request carries the full transcript; the driver cursor
        // feeds each block exactly once, so nothing resets between turns.
    }

    fn update(&mut self, block: &ThreadBlock) {
        match block.kind {
            BlockKind::System => {
                if !self.request.system.is_empty() {
                    self.request.system.push('\n');
                }
                self.request.system.push_str(&block.text);
            }
            BlockKind::Input => self.request.messages.push(MessagesMessage {
                role: "user",
                content: vec![ContentPart::Text {
                    text: block.text.clone(),
                    cache_control: Some(CacheControl::ephemeral()),
                }],
            }),
            BlockKind::InputImage => {
                let Some(image) = &block.image else { return };
                self.request.messages.push(MessagesMessage {
                    role: "user",
                    content: vec![ContentPart::Image {
                        source: ImageSource {
                            source_type: "base64",
                            media_type: image.media_type.clone(),
                            data: image.base64.clone(),
                        },
                    }],
                });
            }
            BlockKind::Text => self.request.messages.push(MessagesMessage {
                role: "assistant",
                content: vec![ContentPart::Text {
                    text: block.text.clone(),
                    cache_control: None,
                }],
            }),
            BlockKind::Thinking => self.request.messages.push(MessagesMessage {
                role: "assistant",
                content: vec![ContentPart::Thinking {
                    thinking: block.text.clone(),
                    signature: block.signature.clone(),
                }],
            }),
            BlockKind::EncryptedThinking => self.request.messages.push(MessagesMessage {
                role: "assistant",
                content: vec![ContentPart::RedactedThinking {
                    data: block.text.clone(),
                }],
            }),
            BlockKind::ToolCall => {
                let Some(call) = &block.tool_call else { return };
                let input = serde_json::from_str(&call.arguments)
                    .unwrap_or_else(|_| serde_json::json!({}));
                self.request.messages.push(MessagesMessage {
                    role: "assistant",
                    content: vec![ContentPart::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input,
                    }],
                });
                if let Some(result) = &block.tool_result {
                    self.request.messages.push(MessagesMessage {
                        role: "user",
                        content: vec![ContentPart::ToolResult {
                            tool_use_id: result.tool_call_id.clone(),
                            content: serde_json::Value::String(result.output.clone()),
                        }],
                    });
                }
            }
            // Server-tool transcripts are not replayed.
            BlockKind::WebSearch | BlockKind::ViewWebpage => {}
        }
    }

    fn build_request(&mut self, _thread: &Thread) -> Result<HttpRequest, AiError> {
        let url = self.config.resolve_endpoint("/v1/messages")?;
        let body = serde_json::to_vec(&self.request)
            .map_err(|e| AiError::decoding(&self.name, e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&self.api_version).map_err(|_| {
                AiError::configuration(&self.name, "api version contains invalid header characters")
            })?,
        );
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.config.api_key).map_err(|_| {
                AiError::authentication(&self.name, "api key contains invalid header characters")
            })?,
        );
        if !self.beta_features.is_empty() {
            headers.insert(
                "anthropic-beta",
                HeaderValue::from_str(&self.beta_features.join(",")).map_err(|_| {
                    AiError::configuration(
                        &self.name,
                        "beta features contain invalid header characters",
                    )
                })?,
            );
        }

        Ok(HttpRequest { url, headers, body })
    }

    fn on_chunk(&mut self, data: &[u8], thread: &mut Thread) -> Result<ChunkStatus, AiError> {
        let envelope: StreamEnvelope = serde_json::from_slice(data)
            .map_err(|e| AiError::decoding(&self.name, e.to_string()))?;

        match envelope.event_type.as_str() {
            "ping" => {}
            "error" => {
                let Some(error) = &envelope.error else {
                    return Err(AiError::unknown(
                        &self.name,
                        String::from_utf8_lossy(data),
                    ));
                };
                if error.message.is_empty() {
                    return Err(AiError::unknown(
                        &self.name,
                        String::from_utf8_lossy(data),
                    ));
                }
                return Err(self.map_stream_error(&error.error_type, &error.message));
            }
            "message_start" => {
                self.targets.clear();
                let Some(message) = &envelope.message else {
                    return Ok(ChunkStatus::Accepted);
                };
                if thread.thread_id.is_empty() && !message.id.is_empty() {
                    thread.thread_id = message.id.clone();
                }
                if let Some(usage) = &message.usage {
                    Self::fold_usage(thread, usage);
                }
            }
            "message_delta" => {
                if let Some(usage) = &envelope.usage {
                    Self::fold_usage(thread, usage);
                }
            }
            "content_block_start" => {
                let (Some(index), Some(block)) = (envelope.index, &envelope.content_block) else {
                    return Ok(ChunkStatus::Accepted);
                };
                self.begin_content_block(index, block, thread);
            }
            "content_block_delta" => {
                let (Some(index), Some(delta)) = (envelope.index, &envelope.delta) else {
                    return Ok(ChunkStatus::Accepted);
                };
                self.apply_delta(index, delta, thread);
            }
            "content_block_stop" => {
                let Some(index) = envelope.index else {
                    return Ok(ChunkStatus::Accepted);
                };
                // Text and thinking blocks finish here; tool calls finish
                // when their result attaches, server tools through their
                // own result events.
                match self.targets.get(&index) {
                    Some(StreamTarget::Text(id)) | Some(StreamTarget::Thinking(id)) => {
                        let id = id.clone();
                        thread.complete(&id);
                    }
                    _ => {}
                }
            }
            "message_stop" => return Ok(ChunkStatus::Done),
            _ => {}
        }
        Ok(ChunkStatus::Accepted)
    }

    fn parse_http_error(&self, status: http::StatusCode, body: &[u8]) -> Option<AiError> {
        let message = serde_json::from_slice::<crate::types::ErrorResponse>(body)
            .map(|r| r.error.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned());

        match status.as_u16() {
            401 | 403 => Some(AiError::authentication(&self.name, message)),
            429 => Some(AiError::rate_limit(&self.name, message)),
            code => Some(AiError::unknown(
                &self.name,
                format!("status {code}: {message}"),
            )),
        }
    }
}
