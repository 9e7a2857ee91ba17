//! Server-sent event decoding for streamed chat completions
//!
//! The upstream sends `data: {json}` frames separated by blank lines and ends
//! with `data: [DONE]`. Chunk boundaries from the transport are arbitrary, so
//! the decoder buffers bytes until a complete frame is available.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::fmt::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::http_client::redact_error_message;
use crate::types::StreamObserver;
use storyflow_utils::error::LlmError;

/// One decoded event frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Payload of the frame's `data:` lines, joined with newlines
    Data(String),
    /// The `[DONE]` sentinel
    Done,
}

/// Incremental SSE frame decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a transport chunk and return every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        // JSON payloads never contain raw CR, so dropping it normalizes CRLF framing.
        self.buffer.extend(chunk.iter().copied().filter(|&b| b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..end + 2).collect();
            if let Some(event) = parse_frame(&frame[..end]) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_frame(&rest)
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(frame: &[u8]) -> Option<SseEvent> {
    let text = String::from_utf8_lossy(frame);
    let mut data: Vec<&str> = Vec::new();
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        }
        // Comments (":") and other fields (event, id, retry) carry no text.
    }
    if data.is_empty() {
        return None;
    }
    let payload = data.join("\n");
    if payload.trim() == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(payload))
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Text fragment carried by one chat-completion chunk.
///
/// Frames that are not valid chunks, or that carry no content, yield `None`
/// and are skipped.
#[must_use]
pub fn delta_content(payload: &str) -> Option<String> {
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty()),
        Err(e) => {
            debug!(error = %e, "Skipping malformed stream frame");
            None
        }
    }
}

/// Read an event stream to completion, accumulating every text fragment.
///
/// Each fragment is also handed to `observer`. Cancellation is checked before
/// every read; when it fires the stream is dropped, which closes the
/// underlying connection.
///
/// # Errors
///
/// - `LlmError::Cancelled` when `cancel` fires
/// - `LlmError::Transport` when the body stream fails
pub async fn consume_event_stream<S, B, E>(
    stream: S,
    observer: &dyn StreamObserver,
    cancel: &CancellationToken,
) -> Result<String, LlmError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::new();
    let mut accumulated = String::new();
    let mut frames = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(frames, "Stream read cancelled");
                return Err(LlmError::Cancelled);
            }
            next = stream.next() => next,
        };

        let ended = next.is_none();
        let events = match next {
            Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
            Some(Err(e)) => {
                return Err(LlmError::Transport(format!(
                    "stream read failed: {}",
                    redact_error_message(&e.to_string())
                )));
            }
            None => decoder.finish().into_iter().collect(),
        };

        for event in events {
            match event {
                SseEvent::Done => {
                    trace!(frames, "Stream completed");
                    return Ok(accumulated);
                }
                SseEvent::Data(payload) => {
                    frames += 1;
                    if let Some(fragment) = delta_content(&payload) {
                        accumulated.push_str(&fragment);
                        observer.on_fragment(&fragment);
                    }
                }
            }
        }

        if ended {
            trace!(frames, "Stream closed without [DONE]");
            return Ok(accumulated);
        }
    }
}
