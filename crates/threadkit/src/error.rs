//! The typed error shared by every adapter and the session driver.
//!
//! All failures — HTTP statuses, in-band provider error events, SSE
//! transport problems, undecodable chunks — collapse into a single
//! [`AiError`] carrying a [`category`](AiError::category), the name of the
//! adapter that raised it, and a one-line message. The rendered form is
//! `[<provider>] <category>: <message>` with newlines flattened so the
//! string is always log-safe.
//!
//! Nothing here is retried; the driver stores the rendered string on the
//! [`Thread`](crate::Thread) and returns. Retry policy belongs to the
//! caller.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The provider throttled the request (HTTP 429 or an in-band
    /// rate-limit event).
    RateLimit,
    /// The API key was rejected (HTTP 401/403 or an in-band
    /// authentication/permission error).
    Authentication,
    /// The SSE transport failed mid-stream, or a handler error with no
    /// more specific category.
    Streaming,
    /// A chunk whose envelope was expected failed to parse as JSON.
    Decoding,
    /// A tool handler's return value could not be serialized.
    ToolResultEncode,
    /// A non-2xx response whose body yielded no typed error.
    HttpStatus,
    /// The request itself was rejected (bad model, missing endpoint,
    /// in-band invalid-request events).
    Configuration,
    /// A provider failure with no specific mapping.
    Unknown,
}

impl ErrorCategory {
    /// The wire/snake_case name of the category.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Authentication => "authentication",
            Self::Streaming => "streaming",
            Self::Decoding => "decoding",
            Self::ToolResultEncode => "tool_result_encode",
            Self::HttpStatus => "http_status",
            Self::Configuration => "configuration",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type produced by adapters and the session driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{provider}] {category}: {message}")]
pub struct AiError {
    /// Broad failure classification.
    pub category: ErrorCategory,
    /// The [`Adapter::name`](crate::Adapter::name) of the adapter that
    /// raised the error (e.g. `"messages.anthropic"`).
    pub provider: String,
    /// Human-readable detail, newline-free.
    pub message: String,
}

impl AiError {
    /// Builds an error, flattening newlines in `message`.
    pub fn new(
        category: ErrorCategory,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            provider: provider.into(),
            message: cleanup_message(&message.into()),
        }
    }

    /// A [`ErrorCategory::RateLimit`] error.
    pub fn rate_limit(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::RateLimit, provider, message)
    }

    /// An [`ErrorCategory::Authentication`] error.
    pub fn authentication(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Authentication, provider, message)
    }

    /// An [`ErrorCategory::Streaming`] error.
    pub fn streaming(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Streaming, provider, message)
    }

    /// An [`ErrorCategory::Decoding`] error.
    pub fn decoding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Decoding, provider, message)
    }

    /// An [`ErrorCategory::ToolResultEncode`] error.
    pub fn tool_result_encode(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ToolResultEncode, provider, message)
    }

    /// An [`ErrorCategory::HttpStatus`] error.
    pub fn http_status(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::HttpStatus, provider, message)
    }

    /// An [`ErrorCategory::Configuration`] error.
    pub fn configuration(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Configuration, provider, message)
    }

    /// An [`ErrorCategory::Unknown`] error.
    pub fn unknown(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Unknown, provider, message)
    }
}

/// Multi-line provider messages collapse to one log line.
fn cleanup_message(message: &str) -> String {
    message.replace('\n', " ")
}
