//! Line-based Server-Sent-Events framing.
//!
//! [`SseFramer`] is a push parser: feed it raw transport bytes as they
//! arrive and it yields complete `(event, data)` pairs, buffering partial
//! lines across chunk boundaries. [`read_sse`] drives a framer over an
//! async byte stream (typically `reqwest::Response::bytes_stream()`) and
//! hands each event to a handler that decides whether to continue.
//!
//! Framing rules:
//!
//! - lines end at `\n`; a trailing `\r` is stripped
//! - `:`-prefixed lines are comments/keepalives and are ignored
//! - `event:` sets the pending event name
//! - `data:` appends its trimmed payload plus a newline to the pending
//!   data buffer (multi-line data joins with `\n`)
//! - an empty line flushes the pending event; a flush with nothing
//!   pending is a no-op
//! - end of stream performs one final flush, including an unterminated
//!   trailing line
//!
//! The `[DONE]` sentinel is delivered like any other event; terminating
//! on it is the session driver's job.

use futures::{Stream, StreamExt};

use crate::error::AiError;

/// One framed SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The `event:` name, or empty if none was sent.
    pub event: String,
    /// The concatenated `data:` payload, without its trailing newline.
    pub data: Vec<u8>,
}

/// Incremental SSE parser over raw bytes.
#[derive(Debug, Default)]
pub struct SseFramer {
    line: Vec<u8>,
    event: String,
    data: Vec<u8>,
}

impl SseFramer {
    /// A framer with empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a transport chunk, returning every event completed by it.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        let mut out = Vec::new();
        for &byte in bytes {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.line);
                self.handle_line(&line, &mut out);
            } else {
                self.line.push(byte);
            }
        }
        out
    }

    /// Flushes at end of stream: an unterminated trailing line is
    /// processed first, then any pending event is delivered.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            let mut out = Vec::new();
            self.handle_line(&line, &mut out);
            // A trailing blank line can flush the pending event itself.
            if let Some(event) = out.into_iter().next() {
                return Some(event);
            }
        }
        self.flush()
    }

    fn handle_line(&mut self, line: &[u8], out: &mut Vec<SseEvent>) {
        let line = strip_suffix(line, b'\r');
        if line.is_empty() {
            if let Some(event) = self.flush() {
                out.push(event);
            }
        } else if line.starts_with(b":") {
            // comment/keepalive
        } else if let Some(rest) = line.strip_prefix(b"event:") {
            self.event = String::from_utf8_lossy(rest.trim_ascii()).into_owned();
        } else if let Some(rest) = line.strip_prefix(b"data:") {
            self.data.extend_from_slice(rest.trim_ascii());
            self.data.push(b'\n');
        }
    }

    fn flush(&mut self) -> Option<SseEvent> {
        if self.event.is_empty() && self.data.is_empty() {
            return None;
        }
        let event = std::mem::take(&mut self.event);
        let mut data = std::mem::take(&mut self.data);
        while data.last() == Some(&b'\n') {
            data.pop();
        }
        if event.is_empty() && data.is_empty() {
            return None;
        }
        Some(SseEvent { event, data })
    }
}

fn strip_suffix(line: &[u8], byte: u8) -> &[u8] {
    match line.split_last() {
        Some((last, rest)) if *last == byte => rest,
        _ => line,
    }
}

/// Drives an [`SseFramer`] over an async byte stream, delivering each
/// event to `on_event`.
///
/// The handler returns `Ok(true)` to keep reading, `Ok(false)` to end the
/// loop, or an error to abort with it (typed errors are preserved
/// verbatim). Transport read failures surface as `streaming` errors
/// tagged with `provider`.
pub async fn read_sse<S, E, F>(provider: &str, body: S, mut on_event: F) -> Result<(), AiError>
where
    S: Stream<Item = Result<bytes::Bytes, E>>,
    E: std::fmt::Display,
    F: FnMut(SseEvent) -> Result<bool, AiError>,
{
    let mut body = std::pin::pin!(body);
    let mut framer = SseFramer::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| AiError::streaming(provider, e.to_string()))?;
        for event in framer.push(&chunk) {
            if !on_event(event)? {
                return Ok(());
            }
        }
    }
    if let Some(event) = framer.finish() {
        on_event(event)?;
    }
    Ok(())
}
