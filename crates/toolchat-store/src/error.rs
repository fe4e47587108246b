//! Error types for transcript persistence.

use thiserror::Error;
use toolchat_core::SessionId;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while loading or saving transcripts.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Nothing is stored for the session.
    #[error("no transcript stored for session {0}")]
    NotFound(SessionId),

    /// The database is missing a column family it was opened with.
    #[error("column family not found: {0}")]
    ColumnFamily(String),

    /// The underlying database failed.
    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),

    /// A stored transcript could not be encoded or decoded.
    #[error("transcript encoding error: {0}")]
    Serialization(String),
}
