//! Google AI Studio generateContent adapter for threadkit.
//!
//! Implements [`Adapter`](threadkit::Adapter) for the
//! `streamGenerateContent` SSE wire shape: contents/parts projection with
//! thought-signature replay, function calling with object-wrapped
//! responses, inline image data, and `usageMetadata` accounting. The API
//! key travels in the query string; there is no Authorization header.

#![warn(missing_docs)]

mod adapter;
mod types;

pub use adapter::AiStudioAdapter;

use threadkit::ProviderConfig;

/// The Google AI Studio generative-language endpoint.
pub fn google(api_key: impl Into<String>) -> AiStudioAdapter {
    AiStudioAdapter::new(ProviderConfig {
        name: "google".into(),
        base_url: "https://generativelanguage.googleapis.com".into(),
        api_key: api_key.into(),
        ..Default::default()
    })
}
