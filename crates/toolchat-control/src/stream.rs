//! Stream consumer for the chat endpoint.
//!
//! The endpoint answers with newline-delimited UTF-8 text. Relevant lines
//! start with `data: ` followed by either the `[DONE]` sentinel or a JSON
//! chunk shaped as
//!
//! ```text
//! {choices:[{delta:{content?, tool_calls?:[{index, id?, function?:{name?, arguments?}}]},
//!            finish_reason?}], error?, details?}
//! ```
//!
//! [`SseDecoder`] buffers bytes across reads and only parses complete lines,
//! so the decoded events do not depend on where the transport split the
//! stream. Malformed payloads are skipped.

use std::collections::VecDeque;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

/// Prefix of every line that carries a payload.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Normal completion.
    Stop,
    /// The model requested tool execution.
    ToolCalls,
}

/// One decoded protocol event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The endpoint reported an error. Nothing else from the same payload
    /// is emitted.
    Error {
        /// Error summary.
        error: String,
        /// Additional detail, if given.
        details: Option<String>,
    },
    /// A fragment of assistant text.
    Content(String),
    /// A fragment of a tool call.
    ToolCallDelta(ToolCallDelta),
    /// A `finish_reason` the consumer acts on.
    Finish(FinishReason),
    /// The `[DONE]` sentinel.
    Done,
}

impl StreamEvent {
    /// Returns true if the turn ends after this event.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Error { .. } | Self::Finish(FinishReason::Stop) | Self::Done
        )
    }
}

/// Partial tool-call data addressed by position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ToolCallDelta {
    /// Slot this fragment belongs to. Missing means 0.
    #[serde(default)]
    pub index: Option<u32>,
    /// Call identifier, usually only on the first fragment.
    #[serde(default)]
    pub id: Option<String>,
    /// Function name and argument text fragment.
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

/// Function part of a [`ToolCallDelta`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionDelta {
    /// Function name, usually only on the first fragment.
    #[serde(default)]
    pub name: Option<String>,
    /// Next piece of the JSON argument text.
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    choices: Option<Vec<Choice>>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    details: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Render a loosely-typed payload field, treating null, false and `""` as absent.
fn field_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Decode one line into events, in priority order.
#[must_use]
pub fn parse_line(line: &str) -> Vec<StreamEvent> {
    let line = line.trim();
    let Some(data) = line.strip_prefix(DATA_PREFIX) else {
        return Vec::new();
    };
    if data == DONE_SENTINEL {
        return vec![StreamEvent::Done];
    }

    let payload: Payload = match serde_json::from_str(data) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::trace!(error = %e, "Skipping malformed stream payload");
            return Vec::new();
        }
    };

    if let Some(error) = field_text(payload.error) {
        return vec![StreamEvent::Error {
            error,
            details: field_text(payload.details),
        }];
    }

    let Some(choice) = payload.choices.and_then(|c| c.into_iter().next()) else {
        return Vec::new();
    };

    let mut events = Vec::new();
    if let Some(delta) = choice.delta {
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            events.push(StreamEvent::Content(content));
        }
        events.extend(
            delta
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(StreamEvent::ToolCallDelta),
        );
    }
    match choice.finish_reason.as_deref() {
        Some("stop") => events.push(StreamEvent::Finish(FinishReason::Stop)),
        Some("tool_calls") => events.push(StreamEvent::Finish(FinishReason::ToolCalls)),
        _ => {}
    }
    events
}

/// Incremental line decoder.
///
/// Bytes are split on `\n` before UTF-8 decoding, so a multi-byte character
/// cut by a read boundary is reassembled before it is interpreted.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one physical read and return the events of every line it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            events.extend(parse_line(&String::from_utf8_lossy(&line)));
        }
        events
    }

    /// Flush the trailing line once the stream has ended.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&line))
    }
}

struct DecodeState<S> {
    bytes: S,
    decoder: SseDecoder,
    queue: VecDeque<StreamEvent>,
    finished: bool,
}

/// Turn a byte stream into a lazy, in-order stream of events.
///
/// A transport error is yielded once and ends the stream.
pub fn decode_stream<S>(bytes: S) -> impl Stream<Item = Result<StreamEvent>>
where
    S: Stream<Item = Result<Vec<u8>>> + Unpin,
{
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::new(),
        queue: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.queue.pop_front() {
                return Some((Ok(event), st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => st.queue.extend(st.decoder.feed(&chunk)),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    st.queue.extend(st.decoder.finish());
                }
            }
        }
    })
}
