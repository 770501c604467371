//! The Responses (OpenAI) adapter.

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use threadkit::{
    Adapter, AiError, BlockKind, ChunkStatus, HttpRequest, ProviderConfig, ReasoningConfig, Thread,
    ThreadBlock, prepare_structured_output_schema,
};
use tracing::trace;

use crate::types::{
    ContentPart, InputItem, Reasoning, ResponsesRequest, StreamEvent, TextConfig, TextFormat,
    ToolSpec,
};

/// Adapter for the OpenAI Responses API.
///
/// Between turns the adapter rebinds `previous_response_id`, letting the
/// server retain conversation history; each turn's `input` list then
/// carries only the new items (tool outputs, fresh user input). A thread
/// restored from a snapshot starts unbound and replays in full.
#[derive(Debug)]
pub struct ResponsesAdapter {
    /// Endpoint, key and the web-search tool label.
    pub config: ProviderConfig,
    /// Ask the server to stream reasoning summaries.
    pub generate_summary: bool,

    name: String,
    request: ResponsesRequest,
    previous_response_id: Option<String>,
}

impl ResponsesAdapter {
    /// An adapter that does not request reasoning summaries.
    pub fn new(config: ProviderConfig) -> Self {
        let name = format!("responses.{}", config.name);
        Self {
            config,
            generate_summary: false,
            name,
            request: ResponsesRequest::default(),
            previous_response_id: None,
        }
    }
}

impl Adapter for ResponsesAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_session(&mut self, thread: &Thread) {
        let mut tools = Vec::with_capacity(thread.tools.len() + 1);
        for (name, def) in &thread.tools {
            tools.push(ToolSpec {
                tool_type: "function".into(),
                name: name.clone(),
                description: def.description.clone(),
                parameters: def.parameters.clone(),
                strict: Some(false),
            });
        }
        if !self.config.web_search_tool.is_empty() && thread.max_web_searches > 0 {
            tools.push(ToolSpec {
                tool_type: self.config.web_search_tool.clone(),
                ..Default::default()
            });
        }

        let reasoning = match &thread.reasoning {
            Some(ReasoningConfig::Effort(effort)) if !effort.is_empty() => Some(Reasoning {
                effort: effort.clone(),
                summary: if self.generate_summary {
                    "auto".into()
                } else {
                    String::new()
                },
            }),
            _ => None,
        };
        let text = thread.structured_output.as_ref().map(|so| TextConfig {
            format: TextFormat {
                format_type: "json_schema",
                name: so.name.clone(),
                schema: prepare_structured_output_schema(&so.schema, so.strict, true),
                strict: so.strict,
            },
        });

        self.previous_response_id = None;
        self.request = ResponsesRequest {
            model: thread.model.clone(),
            input: Vec::new(),
            tools,
            stream: true,
            instructions: String::new(),
            previous_response_id: None,
            reasoning,
            text,
        };
    }

    fn prepare_for_updates(&mut self) {
        // The server retains history through previous_response_id; each
        // turn sends only the items the cursor feeds after this point.
        self.request.input.clear();
    }

    fn update(&mut self, block: &ThreadBlock) {
        match block.kind {
            BlockKind::System => {
                if !self.request.instructions.is_empty() {
                    self.request.instructions.push('\n');
                }
                self.request.instructions.push_str(&block.text);
            }
            BlockKind::Input => self.request.input.push(InputItem {
                role: "user".into(),
                content: vec![ContentPart {
                    part_type: "input_text",
                    text: block.text.clone(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            BlockKind::InputImage => {
                let Some(image) = &block.image else { return };
                self.request.input.push(InputItem {
                    role: "user".into(),
                    content: vec![ContentPart {
                        part_type: "input_image",
                        image_url: format!(
                            "data:{};base64,{}",
                            image.media_type, image.base64
                        ),
                        ..Default::default()
                    }],
                    ..Default::default()
                });
            }
            BlockKind::Text => self.request.input.push(InputItem {
                role: "assistant".into(),
                content: vec![ContentPart {
                    part_type: "output_text",
                    text: block.text.clone(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            BlockKind::ToolCall => {
                let Some(call) = &block.tool_call else { return };
                // With a bound previous response the server already owns
                // its own call items; only replay them on a fresh thread.
                if self.previous_response_id.is_none() {
                    self.request.input.push(InputItem {
                        item_type: "function_call".into(),
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                        ..Default::default()
                    });
                }
                if let Some(result) = &block.tool_result {
                    self.request.input.push(InputItem {
                        item_type: "function_call_output".into(),
                        call_id: result.tool_call_id.clone(),
                        output: result.output.clone(),
                        ..Default::default()
                    });
                }
            }
            // Reasoning summaries and server-tool transcripts cannot be
            // replayed through the input list.
            BlockKind::Thinking
            | BlockKind::EncryptedThinking
            | BlockKind::WebSearch
            | BlockKind::ViewWebpage => {}
        }
    }

    fn build_request(&mut self, _thread: &Thread) -> Result<HttpRequest, AiError> {
        let url = self.config.resolve_endpoint("/v1/responses")?;
        self.request.previous_response_id = self.previous_response_id.clone();
        let body = serde_json::to_vec(&self.request)
            .map_err(|e| AiError::decoding(&self.name, e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_key)).map_err(|_| {
                AiError::authentication(&self.name, "api key contains invalid header characters")
            })?,
        );

        Ok(HttpRequest { url, headers, body })
    }

    fn on_chunk(&mut self, data: &[u8], thread: &mut Thread) -> Result<ChunkStatus, AiError> {
        let event: StreamEvent = serde_json::from_slice(data)
            .map_err(|e| AiError::decoding(&self.name, e.to_string()))?;

        match event.event_type.as_str() {
            "response.output_text.delta" => thread.text(&event.item_id, &event.delta),
            "response.output_text.done" => thread.complete(&event.item_id),
            "response.output_text.annotation.added" => {
                if let Some(annotation) = &event.annotation {
                    if !annotation.url.is_empty() {
                        thread.cite(&event.item_id, annotation.url.clone());
                    }
                }
            }
            "response.reasoning_summary_text.delta" => thread.thinking(&event.item_id, &event.delta),
            "response.reasoning_summary_text.done" => thread.complete(&event.item_id),
            "response.output_item.done" => {
                let Some(item) = &event.item else {
                    return Ok(ChunkStatus::Accepted);
                };
                match item.item_type.as_str() {
                    "function_call" => {
                        thread.tool_call(&item.call_id, &item.name, &item.arguments);
                    }
                    "web_search_call" => {
                        let Some(action) = &item.action else {
                            return Ok(ChunkStatus::Accepted);
                        };
                        if !action.query.is_empty() {
                            thread.web_search(&item.id);
                            thread.web_search_query(&item.id, action.query.clone());
                        } else if !action.url.is_empty() {
                            thread.view_webpage_url(&item.id, action.url.clone());
                        }
                    }
                    "reasoning" => {
                        for part in &item.summary {
                            thread.thinking(&item.id, &part.text);
                        }
                    }
                    other => trace!(item_type = other, "ignoring output item"),
                }
            }
            "response.completed" => {
                let Some(response) = &event.response else {
                    return Ok(ChunkStatus::Done);
                };
                if let Some(usage) = &response.usage {
                    let cached = usage.input_tokens_details.cached_tokens;
                    thread.usage.cache_read_tokens += cached;
                    thread.usage.input_tokens += usage.input_tokens.saturating_sub(cached);
                    thread.usage.output_tokens += usage.output_tokens;
                }
                if !response.id.is_empty() {
                    thread.thread_id = response.id.clone();
                    self.previous_response_id = Some(response.id.clone());
                }
                return Ok(ChunkStatus::Done);
            }
            "response.failed" => {
                let message = event
                    .response
                    .as_ref()
                    .and_then(|r| r.error.as_ref())
                    .map(|e| e.message.clone())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| String::from_utf8_lossy(data).into_owned());
                return Err(AiError::unknown(&self.name, message));
            }
            "error" => {
                let message = event
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| String::from_utf8_lossy(data).into_owned());
                return Err(AiError::unknown(&self.name, message));
            }
            _ => {}
        }
        Ok(ChunkStatus::Accepted)
    }

    fn parse_http_error(&self, status: http::StatusCode, body: &[u8]) -> Option<AiError> {
        let message = serde_json::from_slice::<crate::types::ErrorBody>(body)
            .map(|b| b.error.message)
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
