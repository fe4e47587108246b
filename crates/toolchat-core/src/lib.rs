//! Core types and utilities for toolchat.
//!
//! This crate provides the foundational types shared by the toolchat crates:
//!
//! - **Identifiers**: Process-unique message IDs and per-conversation session IDs
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use toolchat_core::{MessageId, SessionId};
//!
//! // Two IDs minted in the same millisecond never collide
//! let a = MessageId::generate();
//! let b = MessageId::generate();
//! assert_ne!(a, b);
//!
//! // Message IDs round-trip through their `{millis}_{seq}` form
//! let parsed: MessageId = a.to_string().parse().unwrap();
//! assert_eq!(a, parsed);
//!
//! // Generate a session ID
//! let session_id = SessionId::generate();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;

pub use error::{CoreError, Result};
pub use ids::{IdError, MessageId, SessionId};
