//! Anthropic-style Messages adapter for threadkit.
//!
//! Implements [`Adapter`](threadkit::Adapter) for the Messages API wire
//! shape: request projection with prompt caching, extended thinking and
//! redacted-thinking replay, client and server tools, and the full
//! content-block streaming protocol (text, thinking, citations, tool-use
//! argument fragments, server-side web search and web fetch).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use threadkit::{Session, Thread};
//! use threadkit_messages::anthropic;
//!
//! # async fn example() {
//! let mut thread = Thread::new();
//! thread.model = "claude-sonnet-4-20250514".into();
//! thread.input("Hello!");
//!
//! let mut session = Session::new(anthropic(std::env::var("ANTHROPIC_API_KEY").unwrap()), thread);
//! let thread = session.stream(|_| {}).await;
//! # let _ = thread;
//! # }
//! ```

#![warn(missing_docs)]

mod adapter;
mod types;

pub use adapter::MessagesAdapter;

use threadkit::ProviderConfig;

/// The Anthropic Messages API, with its production server-tool labels
/// and the interleaved-thinking beta enabled.
pub fn anthropic(api_key: impl Into<String>) -> MessagesAdapter {
    let mut adapter = MessagesAdapter::new(ProviderConfig {
        name: "anthropic".into(),
        base_url: "https://api.anthropic.com".into(),
        api_key: api_key.into(),
        web_search_tool: "web_search_20250305".into(),
        web_fetch_tool: "web_fetch_20250910".into(),
        ..Default::default()
    });
    adapter.beta_features = vec!["interleaved-thinking-2025-05-14".into()];
    adapter
}
