//! OpenAI Responses API adapter for threadkit.
//!
//! Implements [`Adapter`](threadkit::Adapter) for the Responses wire
//! shape: typed input items, `previous_response_id` server-side history,
//! reasoning summaries, server-side web search, annotation citations and
//! structured output via `text.format`.

#![warn(missing_docs)]

mod adapter;
mod types;

pub use adapter::ResponsesAdapter;

use threadkit::ProviderConfig;

/// The OpenAI Responses API.
pub fn openai(api_key: impl Into<String>) -> ResponsesAdapter {
    ResponsesAdapter::new(ProviderConfig {
        name: "openai".into(),
        base_url: "https://api.openai.com".into(),
        api_key: api_key.into(),
        web_search_tool: "web_search".into(),
        ..Default::default()
    })
}

/// The OpenAI Responses API with reasoning summaries enabled.
pub fn openai_with_summaries(api_key: impl Into<String>) -> ResponsesAdapter {
    let mut adapter = openai(api_key);
    adapter.generate_summary = true;
    adapter
}
