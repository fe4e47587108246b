//! Transcript message types.
//!
//! These types are both the persisted representation of a conversation and
//! the in-memory model the session works against.

use serde::{Deserialize, Serialize};
use toolchat_core::MessageId;

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Text typed by the user.
    User,
    /// Model output: text, or a tool-call request.
    Assistant,
    /// Result of an executed tool call.
    Tool,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Function name and serialized arguments of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function the model asked to invoke.
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

/// One tool-call descriptor carried by an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier assigned by the model.
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The requested function invocation.
    pub function: FunctionCall,
}

impl ToolCall {
    /// Create a function tool call.
    #[must_use]
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// One transcript entry.
///
/// `content` is `None` only for an assistant message that carries tool calls
/// instead of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message.
    pub role: Role,
    /// Text content.
    #[serde(default)]
    pub content: Option<String>,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Call this tool-result message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Stable identity of the message.
    pub message_id: MessageId,
    /// Short text shown instead of `content`; never sent to the model
    /// unless the message has no other content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_content: Option<String>,
    /// Set on assistant messages that report a failed turn.
    #[serde(default)]
    pub is_error: bool,
}

impl Message {
    fn new(role: Role, content: Option<String>, message_id: MessageId) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            message_id,
            display_content: None,
            is_error: false,
        }
    }

    /// Create a user message with a fresh ID.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()), MessageId::generate())
    }

    /// Create an assistant text message with the given ID.
    #[must_use]
    pub fn assistant(message_id: MessageId, content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(content.into()), message_id)
    }

    /// Create the empty assistant message a streaming turn writes into.
    #[must_use]
    pub fn placeholder(message_id: MessageId) -> Self {
        Self::assistant(message_id, String::new())
    }

    /// Create an assistant message that requests a tool call.
    #[must_use]
    pub fn tool_call(message_id: MessageId, call: ToolCall) -> Self {
        let mut msg = Self::new(Role::Assistant, None, message_id);
        msg.tool_calls = Some(vec![call]);
        msg
    }

    /// Create a tool-result message with a fresh ID.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, Some(content.into()), MessageId::generate());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Create an assistant message reporting a failed turn.
    #[must_use]
    pub fn error(message_id: MessageId, content: impl Into<String>) -> Self {
        let mut msg = Self::assistant(message_id, content);
        msg.is_error = true;
        msg
    }

    /// Attach display-only content.
    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display_content = Some(display.into());
        self
    }

    /// Returns true if this assistant message requests at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }

    /// Text to show for this message: display override, then content.
    #[must_use]
    pub fn display_text(&self) -> &str {
        self.display_content
            .as_deref()
            .or(self.content.as_deref())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_serializes_type_field() {
        let call = ToolCall::function("call_1", "api_request", "{}");
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "api_request");
    }

    #[test]
    fn tool_call_message_has_null_content() {
        let msg = Message::tool_call(
            MessageId::generate(),
            ToolCall::function("call_1", "api_request", "{}"),
        );
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_none());
        assert!(msg.has_tool_calls());
    }

    #[test]
    fn display_text_prefers_override() {
        let msg = Message::tool_result("call_1", "Status: 200 OK\n\n{}")
            .with_display("Tool result: Status 200");
        assert_eq!(msg.display_text(), "Tool result: Status 200");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn optional_fields_omitted() {
        let msg = Message::user("hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }
}
