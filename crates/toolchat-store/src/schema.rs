//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Persisted transcripts, keyed by `session_id`.
    ///
    /// Each value is the CBOR-encoded list of the most recent messages.
    pub const TRANSCRIPTS: &str = "transcripts";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::TRANSCRIPTS]
}
