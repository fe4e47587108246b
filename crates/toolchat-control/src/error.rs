//! Error types for conversation orchestration.
//!
//! This module defines all errors that can occur while streaming model
//! responses, executing tool calls and persisting the transcript.

use thiserror::Error;

use crate::lifecycle::{Phase, Trigger};

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in conversation operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The model endpoint answered with a non-success status.
    #[error("HTTP {status}: {status_text}")]
    Http {
        /// Response status code.
        status: u16,
        /// Canonical reason phrase of the status.
        status_text: String,
        /// Response body, used for error detail extraction.
        body: String,
    },

    /// The request could not be sent or the stream broke mid-read.
    #[error("{0}")]
    Transport(String),

    /// A tool call could not be turned into an HTTP request.
    #[error("invalid tool call: {0}")]
    InvalidToolCall(String),

    /// The user message was empty after trimming.
    #[error("message is empty")]
    EmptyMessage,

    /// No tool call is waiting for confirmation.
    #[error("no pending tool call")]
    NoPendingToolCall,

    /// The session cannot handle the trigger in its current phase.
    #[error("cannot apply {trigger:?} while {from:?}")]
    InvalidTransition {
        /// Phase the session was in.
        from: Phase,
        /// Trigger that was rejected.
        trigger: Trigger,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] toolchat_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// Response body attached to the error, if any.
    #[must_use]
    pub fn response_text(&self) -> Option<&str> {
        match self {
            Self::Http { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ControlError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display() {
        let err = ControlError::Http {
            status: 401,
            status_text: "Unauthorized".to_string(),
            body: String::new(),
        };
        assert_eq!(err.to_string(), "HTTP 401: Unauthorized");
        assert!(err.response_text().is_none());
    }

    #[test]
    fn response_text_carries_body() {
        let err = ControlError::Http {
            status: 503,
            status_text: "Service Unavailable".to_string(),
            body: "{\"error\":\"overloaded\"}".to_string(),
        };
        assert_eq!(err.response_text(), Some("{\"error\":\"overloaded\"}"));
        assert!(ControlError::Transport("connection refused".to_string())
            .response_text()
            .is_none());
    }
}
