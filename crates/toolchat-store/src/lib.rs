//! Transcript model and persistence for toolchat.
//!
//! This crate owns the conversation data model ([`Message`], [`Transcript`])
//! and the [`TranscriptStore`] trait used to persist it between runs.
//!
//! # Architecture
//!
//! The `RocksDB` backend uses a single column family:
//!
//! - `transcripts`: CBOR-encoded message list, keyed by `session_id`
//!
//! Every save keeps only the most recent [`MAX_PERSISTED_MESSAGES`] entries,
//! evicting the oldest first. Concurrent writers to the same session are not
//! coordinated; the last write wins.
//!
//! # Example
//!
//! ```no_run
//! use toolchat_store::{Message, RocksStore, TranscriptStore};
//! use toolchat_core::SessionId;
//!
//! let store = RocksStore::open("/tmp/toolchat-db").unwrap();
//! let session_id = SessionId::generate();
//!
//! store.save_transcript(&session_id, &[Message::user("hello")]).unwrap();
//! let messages = store.load_transcript(&session_id).unwrap();
//! assert_eq!(messages.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod transcript;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use transcript::{persisted_window, Transcript, MAX_PERSISTED_MESSAGES};
pub use types::{FunctionCall, Message, Role, ToolCall};

use toolchat_core::SessionId;

/// The storage trait for persisted transcripts.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait TranscriptStore: Send + Sync {
    /// Load the persisted transcript of a session.
    ///
    /// A session that was never saved yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or decoding fails.
    fn load_transcript(&self, session_id: &SessionId) -> Result<Vec<Message>>;

    /// Persist a session's transcript.
    ///
    /// Only the last [`MAX_PERSISTED_MESSAGES`] messages are written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or encoding fails.
    fn save_transcript(&self, session_id: &SessionId, messages: &[Message]) -> Result<()>;

    /// Delete a session's transcript.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if nothing is stored for the session.
    fn delete_transcript(&self, session_id: &SessionId) -> Result<()>;

    /// List every session with a stored transcript.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_sessions(&self) -> Result<Vec<SessionId>>;
}
