//! # threadkit
//!
//! A provider-agnostic streaming conversation engine for LLM chat APIs.
//!
//! The engine keeps one canonical conversation representation — an
//! ordered list of [`ThreadBlock`]s on a [`Thread`] — and projects it
//! into each provider's native wire format on the way out, while
//! consuming each provider's streaming event protocol on the way in,
//! reconstructing blocks incrementally under strict identity and
//! ordering rules. A [`Session`] drives the multi-turn tool-use loop:
//! stream, dispatch tool handlers, re-enter the request loop until no
//! tool calls remain outstanding.
//!
//! This crate contains **zero** provider-specific code. Concrete wire
//! protocols live in sibling crates, each implementing [`Adapter`]:
//!
//! | Crate | Wire shape | Factories |
//! |-------|-----------|-----------|
//! | `threadkit-messages` | Anthropic-style Messages SSE | `anthropic` |
//! | `threadkit-responses` | OpenAI Responses API | `openai` |
//! | `threadkit-completions` | OpenAI-style chat completions | `groq`, `fireworks`, `xai` |
//! | `threadkit-aistudio` | Google AI Studio generateContent | `google` |
//!
//! # Quick start
//!
//! ```rust,no_run
//! use threadkit::{Session, Thread};
//!
//! # async fn example(adapter: impl threadkit::Adapter) {
//! let mut thread = Thread::new();
//! thread.model = "claude-sonnet-4-20250514".into();
//! thread.system("You are terse.");
//! thread.input("What is 2+2?");
//!
//! let mut session = Session::new(adapter, thread);
//! let thread = session.stream(|_partial| {}).await;
//! assert!(thread.success);
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`block`] | Canonical block model and sub-records |
//! | [`thread`] | The conversation, its mutators and snapshots |
//! | [`tool`] | Tool descriptors and the JSON-Schema parameter tree |
//! | [`sse`] | Line-based Server-Sent-Events framing |
//! | [`adapter`] | The nine-operation provider adapter contract |
//! | [`config`] | Provider endpoint configuration |
//! | [`session`] | The streaming / tool-dispatch driver |
//! | [`error`] | The categorised [`AiError`] taxonomy |

#![warn(missing_docs)]

pub mod adapter;
pub mod block;
pub mod config;
pub mod error;
pub mod session;
pub mod sse;
pub mod thread;
pub mod tool;

pub use adapter::{Adapter, ChunkStatus, HttpRequest, Transport};
pub use block::{
    BlockKind, ImageRecord, ThreadBlock, ToolCallRecord, ToolResultRecord, WebSearchRecord,
    WebSearchResult,
};
pub use config::ProviderConfig;
pub use error::{AiError, ErrorCategory};
pub use session::{Session, shared_client};
pub use sse::{SseEvent, SseFramer, read_sse};
pub use thread::{ReasoningConfig, Snapshot, Thread, ThreadUsage, ToolHandler};
pub use tool::{
    AdditionalProperties, JsonSchema, StructuredOutputFormat, ToolDefinition,
    prepare_structured_output_schema,
};
