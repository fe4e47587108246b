//! In-memory transcript with stable message identity.
//!
//! The transcript owns every message of a conversation and their order.
//! Appended messages are immutable except through the single
//! "replace the last assistant message with the same ID" path used while a
//! response streams in.

use toolchat_core::MessageId;

use crate::types::{Message, Role};

/// Number of most recent messages kept when a transcript is persisted.
pub const MAX_PERSISTED_MESSAGES: usize = 20;

/// Returns the tail of `messages` that is persisted.
#[must_use]
pub fn persisted_window(messages: &[Message]) -> &[Message] {
    let start = messages.len().saturating_sub(MAX_PERSISTED_MESSAGES);
    &messages[start..]
}

/// Ordered log of conversation messages.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transcript from previously persisted messages.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self { messages }
    }

    /// Add a message.
    ///
    /// An assistant message whose ID matches the last message (also an
    /// assistant message) replaces it. Anything else is appended.
    pub fn add(&mut self, message: Message) {
        if message.role == Role::Assistant && self.last_is_assistant(message.message_id) {
            if let Some(last) = self.messages.last_mut() {
                *last = message;
                return;
            }
        }
        self.messages.push(message);
    }

    /// Replace the text of the streaming assistant message `id`.
    ///
    /// Only the most recent message is ever touched. Returns `false` (and
    /// changes nothing) when it is not an assistant message with that ID.
    pub fn update_streaming(&mut self, id: MessageId, content: &str) -> bool {
        if !self.last_is_assistant(id) {
            return false;
        }
        match self.messages.last_mut() {
            Some(last) => {
                last.content = Some(content.to_string());
                true
            }
            None => false,
        }
    }

    /// Remove every message with the given ID. Returns how many were removed.
    pub fn remove(&mut self, id: MessageId) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| m.message_id != id);
        before - self.messages.len()
    }

    /// Drop all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// All messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Find a message by ID.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.message_id == id)
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if the transcript holds no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn last_is_assistant(&self, id: MessageId) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role == Role::Assistant && m.message_id == id)
    }
}
