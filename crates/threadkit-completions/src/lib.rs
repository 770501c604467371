//! OpenAI-style chat-completions adapter for threadkit.
//!
//! Implements [`Adapter`](threadkit::Adapter) for `/v1/chat/completions`
//! endpoints: Groq, Fireworks, xAI and anything else speaking the same
//! dialect. Supports streamed tool-call argument fragments, reasoning
//! deltas, data-URL image input and `json_schema` response formats.

#![warn(missing_docs)]

mod adapter;
mod types;

pub use adapter::CompletionsAdapter;

use threadkit::ProviderConfig;

/// Groq's OpenAI-compatible endpoint.
pub fn groq(api_key: impl Into<String>) -> CompletionsAdapter {
    CompletionsAdapter::new(ProviderConfig {
        name: "groq".into(),
        base_url: "https://api.groq.com/openai".into(),
        api_key: api_key.into(),
        ..Default::default()
    })
}

/// Fireworks' OpenAI-compatible inference endpoint.
pub fn fireworks(api_key: impl Into<String>) -> CompletionsAdapter {
    CompletionsAdapter::new(ProviderConfig {
        name: "fireworks".into(),
        base_url: "https://api.fireworks.ai/inference".into(),
        api_key: api_key.into(),
        ..Default::default()
    })
}

/// xAI's OpenAI-compatible endpoint.
pub fn xai(api_key: impl Into<String>) -> CompletionsAdapter {
    CompletionsAdapter::new(ProviderConfig {
        name: "xai".into(),
        base_url: "https://api.x.ai".into(),
        api_key: api_key.into(),
        ..Default::default()
    })
}
