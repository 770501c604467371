//! The AI Studio (Google generateContent) adapter.

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use threadkit::{
    Adapter, AiError, BlockKind, ChunkStatus, HttpRequest, ProviderConfig, ReasoningConfig, Thread,
    ThreadBlock, prepare_structured_output_schema,
};
use url::Url;

use crate::types::{
    Blob, Content, FunctionCall, FunctionResponse, GenerateContentChunk, GenerateContentRequest,
    GenerationConfig, Part, ThinkingConfig, ToolsEntry,
};

/// Adapter for Google's `streamGenerateContent` SSE endpoint.
///
/// Authentication is a query-string key rather than a header, and each
/// SSE payload is one complete JSON document. Function calls arrive
/// without provider ids; the adapter mints fresh block ids for them and
/// replays thought signatures pinned to the call.
#[derive(Debug)]
pub struct AiStudioAdapter {
    /// Endpoint and key.
    pub config: ProviderConfig,

    name: String,
    request: GenerateContentRequest,
}

impl AiStudioAdapter {
    /// An adapter for the given endpoint configuration.
    pub fn new(config: ProviderConfig) -> Self {
        let name = format!("aistudio.{}", config.name);
        Self {
            config,
            name,
            request: GenerateContentRequest::default(),
        }
    }

    /// Google requires function-response payloads to be JSON objects; a
    /// plain-text handler result is wrapped as `{"output": <text>}`.
    fn wrap_tool_output(output: &str) -> serde_json::Value {
        match serde_json::from_str::<serde_json::Value>(output) {
            Ok(value) if value.is_object() => value,
            _ => serde_json::json!({"output": output}),
        }
    }
}

impl Adapter for AiStudioAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_session(&mut self, thread: &Thread) {
        let mut declarations = Vec::with_capacity(thread.tools.len());
        for (name, def) in &thread.tools {
            declarations.push(serde_json::json!({
                "name": name,
                "description": def.description,
                "parameters": def.parameters,
            }));
        }
        let tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolsEntry {
                function_declarations: declarations,
            }]
        };

        let thinking_config = match &thread.reasoning {
            Some(ReasoningConfig::Budget(budget)) => Some(ThinkingConfig {
                thinking_budget: *budget,
            }),
            _ => None,
        };
        // responseSchema rejects additionalProperties, so it is stripped.
        let (response_mime_type, response_schema) = match &thread.structured_output {
            Some(so) => (
                "application/json".to_string(),
                Some(prepare_structured_output_schema(&so.schema, so.strict, false)),
            ),
            None => (String::new(), None),
        };
        let generation_config =
            if thinking_config.is_none() && response_schema.is_none() {
                None
            } else {
                Some(GenerationConfig {
                    response_mime_type,
                    response_schema,
                    thinking_config,
                })
            };

        self.request = GenerateContentRequest {
            system_instruction: None,
            contents: Vec::new(),
            tools,
            generation_config,
        };
    }

    fn prepare_for_updates(&mut self) {
        // Full-transcript request; the driver cursor feeds each block
        // exactly once.
    }

    fn update(&mut self, block: &ThreadBlock) {
        match block.kind {
            BlockKind::System => {
                self.request.system_instruction = Some(Content {
                    role: String::new(),
                    parts: vec![Part {
                        text: block.text.clone(),
                        ..Default::default()
                    }],
                });
            }
            BlockKind::Input => self.request.contents.push(Content {
                role: "user".into(),
                parts: vec![Part {
                    text: block.text.clone(),
                    ..Default::default()
                }],
            }),
            BlockKind::InputImage => {
                let Some(image) = &block.image else { return };
                self.request.contents.push(Content {
                    role: "user".into(),
                    parts: vec![Part {
                        inline_data: Some(Blob {
                            mime_type: image.media_type.clone(),
                            data: image.base64.clone(),
                        }),
                        ..Default::default()
                    }],
                });
            }
            BlockKind::Thinking => self.request.contents.push(Content {
                role: "model".into(),
                parts: vec![Part {
                    text: block.text.clone(),
                    thought: true,
                    thought_signature: block.signature.clone(),
                    ..Default::default()
                }],
            }),
            BlockKind::Text => self.request.contents.push(Content {
                role: "model".into(),
                parts: vec![Part {
                    text: block.text.clone(),
                    ..Default::default()
                }],
            }),
            BlockKind::ToolCall => {
                let Some(call) = &block.tool_call else { return };
                let args = serde_json::from_str(&call.arguments)
                    .unwrap_or_else(|_| serde_json::json!({}));
                self.request.contents.push(Content {
                    role: "model".into(),
                    parts: vec![Part {
                        function_call: Some(FunctionCall {
                            name: call.name.clone(),
                            args,
                        }),
                        thought_signature: block.signature.clone(),
                        ..Default::default()
                    }],
                });
                if let Some(result) = &block.tool_result {
                    self.request.contents.push(Content {
                        role: "model".into(),
                        parts: vec![Part {
                            function_response: Some(FunctionResponse {
                                id: result.tool_call_id.clone(),
                                name: call.name.clone(),
                                response: Self::wrap_tool_output(&result.output),
                            }),
                            ..Default::default()
                        }],
                    });
                }
            }
            // No wire representation for these on this shape.
            BlockKind::EncryptedThinking | BlockKind::WebSearch | BlockKind::ViewWebpage => {}
        }
    }

    fn build_request(&mut self, thread: &Thread) -> Result<HttpRequest, AiError> {
        let models_base = self.config.resolve_endpoint("/v1beta/models/")?;
        let joined = format!(
            "{}/{}:streamGenerateContent",
            models_base.trim_end_matches('/'),
            thread.model
        );
        let mut url = Url::parse(&joined)
            .map_err(|e| AiError::configuration(&self.name, e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("key", &self.config.api_key)
            .append_pair("alt", "sse");

        let body = serde_json::to_vec(&self.request)
            .map_err(|e| AiError::decoding(&self.name, e.to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        Ok(HttpRequest {
            url: url.into(),
            headers,
            body,
        })
    }

    fn on_chunk(&mut self, data: &[u8], thread: &mut Thread) -> Result<ChunkStatus, AiError> {
        let chunk: GenerateContentChunk = serde_json::from_slice(data)
            .map_err(|e| AiError::decoding(&self.name, e.to_string()))?;

        if let Some(usage) = &chunk.usage_metadata {
            let cached = usage.cached_content_token_count;
            thread.usage.input_tokens += usage.prompt_token_count.saturating_sub(cached);
            thread.usage.output_tokens += usage.candidates_token_count;
            thread.usage.cache_read_tokens += cached;
        }
        if !chunk.response_id.is_empty() {
            thread.thread_id = chunk.response_id.clone();
        }

        let Some(candidate) = chunk.candidates.first() else {
            tracing::trace!(response_id = %chunk.response_id, "usage-only chunk");
            return Ok(ChunkStatus::Accepted);
        };
        if candidate.finish_reason.is_some() {
            thread.complete(&chunk.response_id);
            return Ok(ChunkStatus::Done);
        }

        for part in &candidate.content.parts {
            if !part.text.is_empty() {
                if part.thought {
                    thread.thinking_with_signature(
                        &chunk.response_id,
                        &part.text,
                        &part.thought_signature,
                    );
                } else {
                    thread.text(&chunk.response_id, &part.text);
                }
            } else if let Some(call) = &part.function_call {
                let id = thread.new_block_id(BlockKind::ToolCall);
                let args = call.args.to_string();
                thread.tool_call_with_thinking(&id, &call.name, &args, "", &part.thought_signature);
            }
        }
        Ok(ChunkStatus::Accepted)
    }

    fn parse_http_error(&self, status: http::StatusCode, body: &[u8]) -> Option<AiError> {
        let parsed = serde_json::from_slice::<crate::types::ErrorBody>(body).ok()?;
        let code = if parsed.error.code != 0 {
            parsed.error.code
        } else {
            status.as_u16()
        };
        match code {
            401 | 403 => Some(AiError::authentication(&self.name, parsed.error.message)),
            429 => Some(AiError::rate_limit(&self.name, parsed.error.message)),
            _ => Some(AiError::unknown(&self.name, parsed.error.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadkit::{ErrorCategory, JsonSchema, StructuredOutputFormat, ToolDefinition};

    fn adapter() -> AiStudioAdapter {
        AiStudioAdapter::new(ProviderConfig {
            name: "google".into(),
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key: "AIza-test".into(),
            ..Default::default()
        })
    }

    fn feed(adapter: &mut AiStudioAdapter, thread: &mut Thread, data: &str) -> ChunkStatus {
        adapter.on_chunk(data.as_bytes(), thread).unwrap()
    }

    #[test]
    fn test_name() {
        assert_eq!(adapter().name(), "aistudio.google");
    }

    #[test]
    fn test_thinking_and_function_call_together() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        feed(
            &mut adapter,
            &mut thread,
            r#"{"candidates":[{"content":{"parts":[{"text":"Internal...","thought":true,"thoughtSignature":"sig_abc"},{"functionCall":{"name":"get_weather","args":{"location":"Paris"}}}]}}],"usageMetadata":{"promptTokenCount":10,"candidatesTokenCount":20}}"#,
        );

        assert_eq!(thread.blocks.len(), 2);
        let thinking = &thread.blocks[0];
        assert_eq!(thinking.kind, BlockKind::Thinking);
        assert_eq!(thinking.text, "Internal...");
        assert_eq!(thinking.signature, "sig_abc");

        let call = &thread.blocks[1];
        assert_eq!(call.kind, BlockKind::ToolCall);
        let record = call.tool_call.as_ref().unwrap();
        assert_eq!(record.name, "get_weather");
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&record.arguments).unwrap(),
            serde_json::json!({"location": "Paris"})
        );

        assert_eq!(thread.usage.input_tokens, 10);
        assert_eq!(thread.usage.output_tokens, 20);
    }

    #[test]
    fn test_plain_text_parts_accumulate() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        feed(
            &mut adapter,
            &mut thread,
            r#"{"responseId":"resp_1","candidates":[{"content":{"parts":[{"text":"Hello "}]}}]}"#,
        );
        feed(
            &mut adapter,
            &mut thread,
            r#"{"responseId":"resp_1","candidates":[{"content":{"parts":[{"text":"World"}]}}]}"#,
        );

        assert_eq!(thread.thread_id, "resp_1");
        assert_eq!(thread.blocks.len(), 1);
        assert_eq!(thread.blocks[0].text, "Hello World");
    }

    #[test]
    fn test_finish_reason_completes_and_ends() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        feed(
            &mut adapter,
            &mut thread,
            r#"{"responseId":"resp_1","candidates":[{"content":{"parts":[{"text":"done soon"}]}}]}"#,
        );
        let status = feed(
            &mut adapter,
            &mut thread,
            r#"{"responseId":"resp_1","candidates":[{"content":{"parts":[]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":5,"candidatesTokenCount":7}}"#,
        );
        assert_eq!(status, ChunkStatus::Done);
        assert!(thread.blocks[0].complete);
        assert_eq!(thread.usage.output_tokens, 7);
    }

    #[test]
    fn test_cached_tokens_subtracted() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        feed(
            &mut adapter,
            &mut thread,
            r#"{"candidates":[],"usageMetadata":{"promptTokenCount":100,"candidatesTokenCount":10,"cachedContentTokenCount":40}}"#,
        );
        assert_eq!(thread.usage.input_tokens, 60);
        assert_eq!(thread.usage.cache_read_tokens, 40);
    }

    #[test]
    fn test_wrap_tool_output() {
        assert_eq!(
            AiStudioAdapter::wrap_tool_output(r#"{"already":"object"}"#),
            serde_json::json!({"already": "object"})
        );
        assert_eq!(
            AiStudioAdapter::wrap_tool_output("plain text"),
            serde_json::json!({"output": "plain text"})
        );
        assert_eq!(
            AiStudioAdapter::wrap_tool_output("[1,2]"),
            serde_json::json!({"output": "[1,2]"})
        );
    }

    #[test]
    fn test_init_session_config() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        thread.reasoning = Some(ReasoningConfig::Budget(4096));
        thread.structured_output = Some(StructuredOutputFormat {
            name: "out".into(),
            schema: JsonSchema::of_type("object"),
            strict: false,
        });
        thread.tools.insert(
            "get_weather".into(),
            ToolDefinition {
                description: "Weather".into(),
                parameters: Some(JsonSchema::of_type("object")),
            },
        );

        adapter.init_session(&thread);
        let body = serde_json::to_value(&adapter.request).unwrap();
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "get_weather"
        );
        assert_eq!(
            body["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            4096
        );
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert!(body["generationConfig"]["responseSchema"].is_object());
    }

    #[test]
    fn test_update_projection() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        thread.system("be terse");
        thread.input("hi");
        thread.input_image_base64("aGk=", "image/png");
        thread.thinking_with_signature("th", "reason", "sig_1");
        thread.text("t", "answer");
        thread.tool_call_with_thinking("tool_call-6", "lookup", r#"{"q":1}"#, "", "sig_2");
        let call = thread.blocks.last().unwrap().tool_call.clone().unwrap();
        thread.tool_result(&call, "plain result");

        adapter.init_session(&thread);
        for block in &thread.blocks {
            adapter.update(block);
        }

        let body = serde_json::to_value(&adapter.request).unwrap();
        assert_eq!(body["system_instruction"]["parts"][0]["text"], "be terse");
        let contents = body["contents"].as_array().unwrap();
        // user, image, thinking, text, functionCall, functionResponse
        assert_eq!(contents.len(), 6);
        assert_eq!(contents[1]["parts"][0]["inlineData"]["mimeType"], "image/png");
        assert_eq!(contents[2]["parts"][0]["thought"], true);
        assert_eq!(contents[2]["parts"][0]["thoughtSignature"], "sig_1");
        assert_eq!(
            contents[4]["parts"][0]["functionCall"]["args"]["q"],
            1
        );
        assert_eq!(contents[4]["parts"][0]["thoughtSignature"], "sig_2");
        let response = &contents[5]["parts"][0]["functionResponse"];
        assert_eq!(response["name"], "lookup");
        assert_eq!(response["response"]["output"], "plain result");
    }

    #[test]
    fn test_build_request_url_carries_key_in_query() {
        let mut adapter = adapter();
        let mut thread = Thread::new();
        thread.model = "gemini-2.0-flash".into();
        adapter.init_session(&thread);
        let request = adapter.build_request(&thread).unwrap();

        assert!(request.url.starts_with(
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?"
        ));
        assert!(request.url.contains("key=AIza-test"));
        assert!(request.url.contains("alt=sse"));
        assert!(request.headers.get("authorization").is_none());
    }

    #[test]
    fn test_parse_http_error() {
        let adapter = adapter();
        let body = br#"{"error":{"code":401,"message":"key not valid"}}"#;
        let err = adapter
            .parse_http_error(http::StatusCode::UNAUTHORIZED, body)
            .unwrap();
        assert_eq!(err.category, ErrorCategory::Authentication);
        assert_eq!(err.message, "key not valid");

        let body = br#"{"error":{"code":429,"message":"quota"}}"#;
        let err = adapter
            .parse_http_error(http::StatusCode::TOO_MANY_REQUESTS, body)
            .unwrap();
        assert_eq!(err.category, ErrorCategory::RateLimit);

        // An unparseable body defers to the driver's fallback.
        assert!(
            adapter
                .parse_http_error(http::StatusCode::INTERNAL_SERVER_ERROR, b"oops")
                .is_none()
        );
    }
}
