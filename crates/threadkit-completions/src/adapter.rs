//! The chat-completions (OpenAI-style) adapter.

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use threadkit::{
    Adapter, AiError, BlockKind, ChunkStatus, HttpRequest, ProviderConfig, ReasoningConfig, Thread,
    ThreadBlock, prepare_structured_output_schema,
};

use crate::types::{
    CompletionsRequest, ContentPart, FunctionOut, ImageUrl, JsonSchemaFormat, Message,
    ResponseFormat, StreamChunk, StreamOptions, ToolCallOut, WireError,
};

/// Adapter for OpenAI-style `/v1/chat/completions` endpoints (Groq,
/// Fireworks, xAI, and compatible servers).
///
/// Tool-call argument fragments arrive keyed by a call id that is only
/// present on the first fragment; the adapter remembers the most recent
/// id and appends subsequent fragments under it. The stream terminates on
/// the `[DONE]` sentinel, which the session driver consumes — a
/// `finish_reason` only finalizes the turn's blocks so the trailing usage
/// chunk can still arrive.
#[derive(Debug)]
pub struct CompletionsAdapter {
    /// Endpoint, key and optional web-search tool label.
    pub config: ProviderConfig,

    name: String,
    request: CompletionsRequest,
    last_tool_call_id: String,
}

impl CompletionsAdapter {
    /// An adapter for the given endpoint configuration.
    pub fn new(config: ProviderConfig) -> Self {
        let name = format!("completions.{}", config.name);
        Self {
            config,
            name,
            request: CompletionsRequest::default(),
            last_tool_call_id: String::new(),
        }
    }

    fn map_stream_error(&self, error: &WireError) -> AiError {
        let message = if error.message.is_empty() {
            "provider error"
        } else {
            &error.message
        };
        match error.error_type.as_str() {
            "invalid_request_error" => AiError::configuration(&self.name, message),
            "authentication_error" => AiError::authentication(&self.name, message),
            "rate_limit_error" | "rate_limit_exceeded" => AiError::rate_limit(&self.name, message),
            _ => AiError::unknown(&self.name, message),
        }
    }
}

impl Adapter for CompletionsAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_session(&mut self, thread: &Thread) {
        let mut tools = Vec::with_capacity(thread.tools.len() + 1);
        for (name, def) in &thread.tools {
            tools.push(serde_json::json!({
                "type": "function",
                "function": {
                    "name": name,
                    "description": def.description,
                    "parameters": def.parameters,
                },
            }));
        }
        if !self.config.web_search_tool.is_empty() && thread.max_web_searches > 0 {
            tools.push(serde_json::json!({"type": self.config.web_search_tool}));
        }

        let reasoning_effort = match &thread.reasoning {
            Some(ReasoningConfig::Effort(effort)) if !effort.is_empty() => Some(effort.clone()),
            _ => None,
        };
        let response_format = thread.structured_output.as_ref().map(|so| ResponseFormat {
            format_type: "json_schema",
            json_schema: JsonSchemaFormat {
                name: so.name.clone(),
                schema: prepare_structured_output_schema(&so.schema, so.strict, true),
                strict: so.strict,
            },
        });

        self.last_tool_call_id.clear();
        self.request = CompletionsRequest {
            model: thread.model.clone(),
            messages: Vec::new(),
            tools,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            reasoning_effort,
            response_format,
        };
    }

    fn prepare_for_updates(&mut self) {
        // Full-transcript request; the driver cursor feeds each block
        // exactly once.
    }

    fn update(&mut self, block: &ThreadBlock) {
        match block.kind {
            BlockKind::System => self.request.messages.push(Message {
                role: "system",
                content: vec![ContentPart::Text {
                    text: block.text.clone(),
                }],
                ..Default::default()
            }),
            BlockKind::Input => self.request.messages.push(Message {
                role: "user",
                content: vec![ContentPart::Text {
                    text: block.text.clone(),
                }],
                ..Default::default()
            }),
            BlockKind::InputImage => {
                let Some(image) = &block.image else { return };
                self.request.messages.push(Message {
                    role: "user",
                    content: vec![ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:{};base64,{}", image.media_type, image.base64),
                        },
                    }],
                    ..Default::default()
                });
            }
            BlockKind::Text => self.request.messages.push(Message {
                role: "assistant",
                content: vec![ContentPart::Text {
                    text: block.text.clone(),
                }],
                ..Default::default()
            }),
            BlockKind::ToolCall => {
                let Some(call) = &block.tool_call else { return };
                self.request.messages.push(Message {
                    role: "assistant",
                    tool_calls: vec![ToolCallOut {
                        id: call.id.clone(),
                        call_type: "function",
                        function: FunctionOut {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    }],
                    ..Default::default()
                });
                if let Some(result) = &block.tool_result {
                    self.request.messages.push(Message {
                        role: "tool",
                        content: vec![ContentPart::Text {
                            text: result.output.clone(),
                        }],
                        tool_call_id: result.tool_call_id.clone(),
                        ..Default::default()
                    });
                }
            }
            // No wire representation for these on the completions shape.
            BlockKind::Thinking
            | BlockKind::EncryptedThinking
            | BlockKind::WebSearch
            | BlockKind::ViewWebpage => {}
        }
    }

    fn build_request(&mut self, _thread: &Thread) -> Result<HttpRequest, AiError> {
        let url = self.config.resolve_endpoint("/v1/chat/completions")?;
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
        let chunk: StreamChunk = serde_json::from_slice(data)
            .map_err(|e| AiError::decoding(&self.name, e.to_string()))?;
        tracing::trace!(chunk_id = %chunk.id, choices = chunk.choices.len(), "completions chunk");

        if let Some(error) = &chunk.error {
            return Err(self.map_stream_error(error));
        }

        if let Some(usage) = &chunk.usage {
            let cached = usage.prompt_tokens_details.cached_tokens;
            thread.usage.input_tokens += usage.prompt_tokens.saturating_sub(cached);
            thread.usage.output_tokens += usage.completion_tokens;
            thread.usage.cache_read_tokens += cached;
        }

        for choice in &chunk.choices {
            let base_id = format!("{}-{}", chunk.id, choice.index);

            let reasoning = if choice.delta.reasoning_content.is_empty() {
                &choice.delta.reasoning
            } else {
                &choice.delta.reasoning_content
            };
            if !reasoning.is_empty() {
                thread.thinking(&format!("{base_id}-thinking"), reasoning);
            }
            if !choice.delta.content.is_empty() {
                thread.text(&base_id, &choice.delta.content);
            }

            for call in &choice.delta.tool_calls {
                if !call.id.is_empty() {
                    self.last_tool_call_id = call.id.clone();
                }
                let (name, arguments) = match &call.function {
                    Some(function) => (function.name.as_str(), function.arguments.as_str()),
                    None => ("", ""),
                };
                if self.last_tool_call_id.is_empty() {
                    continue;
                }
                let id = self.last_tool_call_id.clone();
                thread.tool_call(&id, name, arguments);
            }

            if choice.finish_reason.is_some() {
                thread.complete(&base_id);
                thread.complete(&format!("{base_id}-thinking"));
            }
        }

        // End of stream is the [DONE] sentinel, handled by the driver.
        Ok(ChunkStatus::Accepted)
    }

    fn parse_http_error(&self, status: http::StatusCode, body: &[u8]) -> Option<AiError> {
        if let Ok(parsed) = serde_json::from_slice::<crate::types::ErrorBody>(body) {
            if !parsed.error.error_type.is_empty() || !parsed.error.message.is_empty() {
                match parsed.error.error_type.as_str() {
                    "invalid_request_error" => {
                        return Some(AiError::configuration(&self.name, parsed.error.message));
                    }
                    "authentication_error" => {
                        return Some(AiError::authentication(&self.name, parsed.error.message));
                    }
                    "rate_limit_error" => {
                        return Some(AiError::rate_limit(&self.name, parsed.error.message));
                    }
                    _ => {}
                }
            }
        }

        let message = String::from_utf8_lossy(body).into_owned();
        match status.as_u16() {
            401 | 403 => Some(AiError::authentication(&self.name, message)),
            404 => Some(AiError::configuration(&self.name, message)),
            429 => Some(AiError::rate_limit(&self.name, message)),
            code => Some(AiError::unknown(
                &self.name,
                format!("status {code}: {message}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadkit::{ErrorCategory, JsonSchema, StructuredOutputFormat, ToolDefinition};

    fn adapter() -> CompletionsAdapter {
        CompletionsAdapter::new(ProviderConfig {
            name: "groq".into(),
            base_url: "https://api.groq.com/openai".into(),
            api_key: "gsk-test".into(),
            ..Default::default()
        })
    }

    fn feed(adapter: &mut CompletionsAdapter, thread: &mut Thread, data: &str) -> ChunkStatus {
        adapter.on_chunk(data.as_bytes(), thread).unwrap()
    }

    #[test]
    fn test_name() {
        assert_eq!(adapter().name(), "completions.groq");
    }

    #[test]
    fn test_streaming_tool_arguments() {
        let mut adapter = adapter();
        let mut thread = Thread::new();

        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_xyz","type":"function","function":{"name":"get_weather","arguments":""}}]}}]}"#,
        );
        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"location\":"}}]}}]}"#,
        );
        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"chatcmpl-1","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":" \"Paris\"}"}}]}}]}"#,
        );

        assert_eq!(thread.blocks.len(), 1);
        let block = &thread.blocks[0];
        assert_eq!(block.kind, BlockKind::ToolCall);
        assert!(!block.complete);
        let call = block.tool_call.as_ref().unwrap();
        assert_eq!(call.id, "call_xyz");
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments, r#"{"location": "Paris"}"#);
    }

    #[test]
    fn test_text_and_reasoning_deltas() {
        let mut adapter = adapter();
        let mut thread = Thread::new();

        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"chatcmpl-2","choices":[{"index":0,"delta":{"reasoning_content":"thinking hard"}}]}"#,
        );
        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"chatcmpl-2","choices":[{"index":0,"delta":{"content":"Hello"}}]}"#,
        );
        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"chatcmpl-2","choices":[{"index":0,"delta":{"content":" World"}}]}"#,
        );

        assert_eq!(thread.blocks.len(), 2);
        assert_eq!(thread.blocks[0].kind, BlockKind::Thinking);
        assert_eq!(thread.blocks[0].id, "chatcmpl-2-0-thinking");
        assert_eq!(thread.blocks[0].text, "thinking hard");
        assert_eq!(thread.blocks[1].id, "chatcmpl-2-0");
        assert_eq!(thread.blocks[1].text, "Hello World");
    }

    #[test]
    fn test_bare_reasoning_field() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"c","choices":[{"index":0,"delta":{"reasoning":"via the other field"}}]}"#,
        );
        assert_eq!(thread.blocks[0].text, "via the other field");
    }

    #[test]
    fn test_finish_reason_completes_blocks() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"c1","choices":[{"index":0,"delta":{"reasoning_content":"r"}}]}"#,
        );
        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"text"}}]}"#,
        );
        let status = feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"c1","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
        );

        // The turn keeps streaming until [DONE] so trailing usage arrives.
        assert_eq!(status, ChunkStatus::Accepted);
        assert!(thread.blocks.iter().all(|b| b.complete));
    }

    #[test]
    fn test_usage_only_chunk() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        feed(
            &mut adapter,
            &mut thread,
            r#"{"id":"c1","choices":[],"usage":{"prompt_tokens":120,"completion_tokens":30,"prompt_tokens_details":{"cached_tokens":20}}}"#,
        );
        assert_eq!(thread.usage.input_tokens, 100);
        assert_eq!(thread.usage.output_tokens, 30);
        assert_eq!(thread.usage.cache_read_tokens, 20);
        assert!(thread.blocks.is_empty());
    }

    #[test]
    fn test_in_band_error_mapping() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        let cases = [
            ("invalid_request_error", ErrorCategory::Configuration),
            ("authentication_error", ErrorCategory::Authentication),
            ("rate_limit_error", ErrorCategory::RateLimit),
            ("weird_error", ErrorCategory::Unknown),
        ];
        for (error_type, category) in cases {
            let payload = format!(
                r#"{{"error":{{"message":"m","type":"{error_type}"}}}}"#
            );
            let err = adapter.on_chunk(payload.as_bytes(), &mut thread).unwrap_err();
            assert_eq!(err.category, category, "for {error_type}");
        }
    }

    #[test]
    fn test_init_session_request_shape() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        thread.model = "llama-3.3-70b".into();
        thread.reasoning = Some(ReasoningConfig::Effort("medium".into()));
        thread.structured_output = Some(StructuredOutputFormat {
            name: "out".into(),
            schema: JsonSchema::of_type("object"),
            strict: true,
        });
        thread.tools.insert(
            "lookup".into(),
            ToolDefinition {
                description: "Find".into(),
                parameters: Some(JsonSchema::of_type("object")),
            },
        );

        adapter.init_session(&thread);
        let body = serde_json::to_value(&adapter.request).unwrap();
        assert_eq!(body["model"], "llama-3.3-70b");
        assert_eq!(body["stream"], true);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["reasoning_effort"], "medium");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "lookup");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
    }

    #[test]
    fn test_budget_reasoning_ignored() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        thread.reasoning = Some(ReasoningConfig::Budget(512));
        adapter.init_session(&thread);
        assert!(adapter.request.reasoning_effort.is_none());
    }

    #[test]
    fn test_update_projection() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        thread.system("be terse");
        thread.input("hi");
        thread.input_image_base64("aGk=", "image/jpeg");
        thread.thinking("th", "hidden");
        thread.text("t", "answer");
        thread.tool_call("call_1", "lookup", r#"{"q":1}"#);
        let call = thread.blocks.last().unwrap().tool_call.clone().unwrap();
        thread.tool_result(&call, "result");

        adapter.init_session(&thread);
        for block in &thread.blocks {
            adapter.update(block);
        }

        let body = serde_json::to_value(&adapter.request).unwrap();
        let messages = body["messages"].as_array().unwrap();
        // system, user, image, assistant text, assistant tool_calls, tool
        // — thinking is not forwarded on this wire shape.
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(
            messages[2]["content"][0]["image_url"]["url"],
            "data:image/jpeg;base64,aGk="
        );
        assert_eq!(messages[4]["tool_calls"][0]["id"], "call_1");
        assert_eq!(
            messages[4]["tool_calls"][0]["function"]["arguments"],
            r#"{"q":1}"#
        );
        assert_eq!(messages[5]["role"], "tool");
        assert_eq!(messages[5]["tool_call_id"], "call_1");
        assert_eq!(messages[5]["content"][0]["text"], "result");
    }

    #[test]
    fn test_build_request_headers() {
        let mut adapter = adapter();
        let thread = Thread::new();
        adapter.init_session(&thread);
        let request = adapter.build_request(&thread).unwrap();
        assert_eq!(
            request.url,
            "https://api.groq.com/openai/v1/chat/completions"
        );
        assert_eq!(
            request.headers.get("authorization").unwrap(),
            "Bearer gsk-test"
        );
    }

    #[test]
    fn test_parse_http_error_status_mapping() {
        let adapter = adapter();
        let err = adapter
            .parse_http_error(http::StatusCode::NOT_FOUND, b"no such model")
            .unwrap();
        assert_eq!(err.category, ErrorCategory::Configuration);

        let err = adapter
            .parse_http_error(http::StatusCode::UNAUTHORIZED, b"denied")
            .unwrap();
        assert_eq!(err.category, ErrorCategory::Authentication);

        let err = adapter
            .parse_http_error(
                http::StatusCode::BAD_REQUEST,
                br#"{"error":{"message":"bad param","type":"invalid_request_error"}}"#,
            )
            .unwrap();
        assert_eq!(err.category, ErrorCategory::Configuration);
        assert_eq!(err.message, "bad param");

        let err = adapter
            .parse_http_error(http::StatusCode::BAD_GATEWAY, b"gateway")
            .unwrap();
        assert_eq!(err.category, ErrorCategory::Unknown);
    }
}
