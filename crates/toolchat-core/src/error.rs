//! Errors shared by the toolchat crates.

use crate::ids::{IdError, SessionId};
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors about identifying a conversation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// A session was asked for by id but nothing is stored for it.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
}
