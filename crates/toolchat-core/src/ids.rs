//! Core identifier types for toolchat.
//!
//! This module provides strongly-typed identifiers for transcript messages and
//! conversation sessions.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Per-process counter mixed into every [`MessageId`].
static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A process-unique transcript message identifier.
///
/// Combines the wall-clock creation time in milliseconds with a monotonic
/// per-process sequence number, so two messages created within the same
/// millisecond still get distinct IDs. The string form is `{millis}_{seq}`.
///
/// Ordering compares creation time first and the sequence number second.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId {
    millis: u64,
    seq: u64,
}

impl MessageId {
    /// Generate a new unique `MessageId`.
    #[must_use]
    pub fn generate() -> Self {
        let millis = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default();
        let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
        Self { millis, seq }
    }

    /// Creation time in milliseconds since the Unix epoch.
    #[must_use]
    pub const fn millis(&self) -> u64 {
        self.millis
    }

    /// Per-process sequence number.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

impl FromStr for MessageId {
    type Err = IdError;

    /// Parse a `MessageId` from its `{millis}_{seq}` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (millis, seq) = s.split_once('_').ok_or(IdError::InvalidMessageId)?;
        let millis = millis.parse().map_err(|_| IdError::InvalidMessageId)?;
        let seq = seq.parse().map_err(|_| IdError::InvalidMessageId)?;
        Ok(Self { millis, seq })
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageId({}_{})", self.millis, self.seq)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.millis, self.seq)
    }
}

impl TryFrom<String> for MessageId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

/// A 16-byte session identifier based on UUID v4.
///
/// A session is one conversation; its ID keys the persisted transcript.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Create a `SessionId` from raw UUID bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    /// Generate a new random `SessionId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the bytes of the UUID.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl FromStr for SessionId {
    type Err = IdError;

    /// Parse a `SessionId` from a UUID string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0.to_string()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not of the form `{millis}_{seq}`.
    #[error("invalid message ID format")]
    InvalidMessageId,

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}
