//! The contract between the session driver and a provider adapter.
//!
//! An adapter owns everything protocol-specific: how a [`Thread`] projects
//! into a provider request, and how the provider's stream events map back
//! onto Thread mutations. The engine ships four implementations — the
//! Messages, Responses, chat-completions and AI Studio wire shapes — and
//! the set is closed by design; the driver never discovers adapters at
//! runtime.

use http::HeaderMap;

use crate::error::AiError;
use crate::thread::Thread;
use crate::block::ThreadBlock;

/// How the provider delivers its response stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Server-Sent Events over a streaming HTTP response.
    Sse,
}

/// A fully built provider request, transport-neutral.
///
/// Adapters produce one of these from their internal request state; the
/// session driver turns it into an HTTP POST. Keeping the type free of
/// any client handle makes request construction testable offline.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Absolute request URL, including any query string.
    pub url: String,
    /// Headers to send (authorization, content negotiation, provider
    /// version/beta headers).
    pub headers: HeaderMap,
    /// Serialized JSON body.
    pub body: Vec<u8>,
}

/// Outcome of feeding one stream payload to an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// The payload was consumed; keep streaming.
    Accepted,
    /// The provider signalled end-of-turn.
    Done,
}

/// Per-provider translator between a [`Thread`] and one wire protocol.
///
/// Lifecycle, as driven by [`Session::stream`](crate::Session::stream):
/// [`init_session`](Self::init_session) once, then per turn
/// [`prepare_for_updates`](Self::prepare_for_updates), one
/// [`update`](Self::update) per new block,
/// [`build_request`](Self::build_request), and
/// [`on_chunk`](Self::on_chunk) for every SSE data payload until it
/// returns [`ChunkStatus::Done`] or errors.
pub trait Adapter: Send {
    /// Stable identifier of this adapter instance, of the form
    /// `"<protocol>.<provider>"` (e.g. `"messages.anthropic"`). Stamped
    /// onto blocks the adapter produces and onto every error it raises.
    fn name(&self) -> &str;

    /// The response transport this adapter consumes.
    fn transport(&self) -> Transport {
        Transport::Sse
    }

    /// Snapshots static per-turn configuration from the thread: tools,
    /// server-tool entries, reasoning, structured output, token ceilings.
    fn init_session(&mut self, thread: &Thread);

    /// Called at the top of every turn, before the block cursor catches
    /// up. Adapters whose server retains history clear their per-turn
    /// input list here.
    fn prepare_for_updates(&mut self);

    /// Projects one block into the adapter's internal request, ignoring
    /// kinds its wire shape has no representation for.
    fn update(&mut self, block: &ThreadBlock);

    /// Serializes the internal request and provider headers.
    fn build_request(&mut self, thread: &Thread) -> Result<HttpRequest, AiError>;

    /// Decodes one SSE data payload and applies its Thread mutations.
    fn on_chunk(&mut self, data: &[u8], thread: &mut Thread) -> Result<ChunkStatus, AiError>;

    /// Maps a non-2xx response to a typed error, or `None` to let the
    /// driver fall back to a generic `http_status` error.
    fn parse_http_error(&self, status: http::StatusCode, body: &[u8]) -> Option<AiError>;
}
