//! Feedback loop between tool execution and the model.
//!
//! After every tool execution the result is appended to the transcript as a
//! tool message and the model is re-invoked, unless the tool has now failed
//! [`MAX_TOOL_RETRIES`] times in a row. A successful execution resets the
//! count.

use serde::{Deserialize, Serialize};
use toolchat_core::MessageId;
use toolchat_store::{Message, Role, ToolCall};

/// Consecutive failed tool executions that end the turn.
pub const MAX_TOOL_RETRIES: u32 = 3;

/// Tool-result bodies sent to the model are cut to this many characters.
pub const MAX_RESULT_BODY_CHARS: usize = 4000;

/// Excerpt length of the last failing body in the final error message.
pub const MAX_ERROR_EXCERPT_CHARS: usize = 500;

/// Fallback identifier when the pending call carries none.
const UNKNOWN_CALL_ID: &str = "call_unknown";

/// Outcome of one tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// HTTP status; `0` when the request never got a response.
    pub status: u16,
    /// Reason phrase.
    pub status_text: String,
    /// Response body as text.
    pub body: String,
}

impl ExecutionResult {
    /// Create a result from a received response.
    #[must_use]
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body: body.into(),
        }
    }

    /// Result for a request that failed before a response arrived.
    #[must_use]
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::new(0, "Network Error", message)
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// What the loop does after recording a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-invoke the model with the result.
    Continue,
    /// Stop the turn with a final error.
    Exhausted,
}

/// Consecutive failure counter for one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    count: u32,
}

impl RetryState {
    /// Create a counter at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { count: 0 }
    }

    /// Record an execution result and decide whether to continue.
    pub fn record(&mut self, result: &ExecutionResult) -> RetryDecision {
        if result.is_success() {
            self.count = 0;
            return RetryDecision::Continue;
        }

        self.count += 1;
        tracing::debug!(
            status = result.status,
            count = self.count,
            max = MAX_TOOL_RETRIES,
            "Tool execution failed"
        );
        if self.count >= MAX_TOOL_RETRIES {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Continue
        }
    }

    /// Current consecutive failure count.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Reset the counter.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Build the tool message that reports a result to the model.
#[must_use]
pub fn tool_result_message(call_id: Option<&str>, result: &ExecutionResult) -> Message {
    let call_id = call_id.filter(|id| !id.is_empty()).unwrap_or(UNKNOWN_CALL_ID);
    let content = format!(
        "Status: {} {}\n\n{}",
        result.status,
        result.status_text,
        truncate_chars(&result.body, MAX_RESULT_BODY_CHARS)
    );
    Message::tool_result(call_id, content)
        .with_display(format!("Tool result: Status {}", result.status))
}

/// Build the final error message once retries are exhausted.
#[must_use]
pub fn retries_exhausted_message(result: &ExecutionResult) -> Message {
    let mut content = format!(
        "Max tool call retries ({MAX_TOOL_RETRIES}) reached. Last error: Status {} {}",
        result.status, result.status_text
    );
    if !result.body.is_empty() {
        content.push_str("\n\n```\n");
        content.push_str(truncate_chars(&result.body, MAX_ERROR_EXCERPT_CHARS));
        content.push_str("\n```");
    }
    content.push_str("\n\nPlease try a different approach.");
    Message::error(MessageId::generate(), content)
}

/// A transcript message as sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    /// Author role.
    pub role: Role,
    /// Text content; serialized as `null` for tool-call messages.
    pub content: Option<String>,
    /// Tool calls requested by an assistant message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Call a tool message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl From<&Message> for OutboundMessage {
    fn from(msg: &Message) -> Self {
        let content = if msg.content.is_none() && !msg.has_tool_calls() {
            Some(msg.display_content.clone().unwrap_or_default())
        } else {
            msg.content.clone()
        };
        Self {
            role: msg.role,
            content,
            tool_calls: msg.tool_calls.clone(),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

/// Project the transcript into the message list sent to the model.
///
/// Display-only fields and message identity are dropped.
#[must_use]
pub fn project_outbound(messages: &[Message]) -> Vec<OutboundMessage> {
    messages.iter().map(OutboundMessage::from).collect()
}
