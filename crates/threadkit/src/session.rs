//! The session driver: init → send → stream → tool-dispatch → loop.
//!
//! A [`Session`] owns one [`Thread`] and one [`Adapter`] and runs the
//! outer control flow: it walks new blocks into the adapter (dispatching
//! tool handlers along the way), sends the provider request, feeds the
//! SSE response through the framer into the adapter, and loops until no
//! tool calls remain outstanding or an error terminates the stream.
//!
//! A session is single-owner; one conversation is never streamed
//! concurrently. Tool handlers run synchronously on the driver's task and
//! must not mutate the thread themselves.
//!
//! Partial-update delivery is edge-triggered: `on_partial` fires at most
//! once per block-mutating chunk, no matter how many mutations the chunk
//! applied. Usage-only payloads, pings and stop events do not fire it.

use std::sync::OnceLock;

use tracing::{debug, instrument};

use crate::adapter::{Adapter, ChunkStatus, Transport};
use crate::block::BlockKind;
use crate::error::AiError;
use crate::sse::read_sse;
use crate::thread::Thread;

/// The process-wide HTTP client used by sessions that don't bring their
/// own. Built once with default settings; `reqwest::Client` is cheaply
/// cloneable.
pub fn shared_client() -> reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(reqwest::Client::new).clone()
}

/// Drives one [`Thread`] against one [`Adapter`].
pub struct Session<A> {
    /// The provider adapter.
    pub adapter: A,
    /// The conversation being driven.
    pub thread: Thread,
    client: reqwest::Client,
}

impl<A: Adapter> Session<A> {
    /// A session using the process-wide shared HTTP client.
    pub fn new(adapter: A, thread: Thread) -> Self {
        Self::with_client(adapter, thread, shared_client())
    }

    /// A session with a caller-supplied HTTP client (custom timeouts,
    /// proxies, connection pools).
    pub fn with_client(adapter: A, thread: Thread, client: reqwest::Client) -> Self {
        Self {
            adapter,
            thread,
            client,
        }
    }

    /// Consumes the session, returning its thread.
    pub fn into_thread(self) -> Thread {
        self.thread
    }

    /// Runs the streaming loop to completion.
    ///
    /// On success `thread.success` is `true` and every tool call carries
    /// its result. On failure `thread.success` is `false` and
    /// `thread.error` holds the rendered error; blocks reconstructed
    /// before the failure are kept as-is. Either way the thread is
    /// returned for inspection.
    ///
    /// `on_partial` is invoked after every chunk that mutated a block.
    #[instrument(skip_all, fields(provider = %self.adapter.name(), model = %self.thread.model))]
    pub async fn stream(&mut self, mut on_partial: impl FnMut(&Thread)) -> &Thread {
        let provider = self.adapter.name().to_string();
        self.thread.current_provider = provider.clone();
        self.adapter.init_session(&self.thread);

        let mut last_block = 0usize;
        loop {
            self.adapter.prepare_for_updates();

            // Catch the adapter up on blocks it has not seen, dispatching
            // tool handlers for calls that still lack a result.
            while last_block < self.thread.blocks.len() {
                let kind = self.thread.blocks[last_block].kind;

                if matches!(kind, BlockKind::Thinking | BlockKind::EncryptedThinking) {
                    // Thinking blobs and their signatures are only
                    // meaningful to the adapter that produced them.
                    let producer = &self.thread.blocks[last_block].provider_id;
                    if !producer.is_empty() && *producer != provider {
                        last_block += 1;
                        continue;
                    }
                }

                if kind == BlockKind::ToolCall && self.thread.blocks[last_block].tool_result.is_none()
                {
                    let Some(call) = self.thread.blocks[last_block].tool_call.clone() else {
                        last_block += 1;
                        continue;
                    };
                    let Some(output) = self.thread.handle_tool(&call.name, &call.arguments) else {
                        let err = AiError::configuration(
                            &provider,
                            format!("no tool handler configured for {}", call.name),
                        );
                        self.thread.set_error(&err);
                        return &self.thread;
                    };
                    self.thread.tool_result(&call, output);
                }

                let block = self.thread.blocks[last_block].clone();
                self.adapter.update(&block);
                last_block += 1;
            }

            let request = match self.adapter.build_request(&self.thread) {
                Ok(request) => request,
                Err(err) => {
                    self.thread.set_error(&err);
                    return &self.thread;
                }
            };
            debug!(url = %request.url, "sending provider request");

            let response = match self
                .client
                .post(&request.url)
                .headers(request.headers)
                .body(request.body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    let err = AiError::streaming(&provider, err.to_string());
                    self.thread.set_error(&err);
                    return &self.thread;
                }
            };

            let status = response.status();
            if status.as_u16() >= 300 {
                let body = response.bytes().await.unwrap_or_default();
                let err = self
                    .adapter
                    .parse_http_error(status, &body)
                    .unwrap_or_else(|| {
                        AiError::http_status(
                            &provider,
                            format!(
                                "unhandled status {} with body {}",
                                status.as_u16(),
                                String::from_utf8_lossy(&body)
                            ),
                        )
                    });
                self.thread.set_error(&err);
                return &self.thread;
            }

            let outcome = match self.adapter.transport() {
                Transport::Sse => {
                    let Self {
                        adapter, thread, ..
                    } = self;
                    read_sse(&provider, response.bytes_stream(), |event| {
                        if event.data.is_empty() {
                            return Ok(true);
                        }
                        if event.data == b"[DONE]" {
                            return Ok(false);
                        }
                        let result = adapter.on_chunk(&event.data, thread);
                        if thread.take_update() {
                            on_partial(thread);
                        }
                        match result? {
                            ChunkStatus::Accepted => Ok(true),
                            ChunkStatus::Done => Ok(false),
                        }
                    })
                    .await
                }
            };

            if let Err(err) = outcome {
                self.thread.set_error(&err);
                return &self.thread;
            }
            if self.thread.incomplete_tool_calls() == 0 {
                self.thread.success = true;
                return &self.thread;
            }
        }
    }
}
