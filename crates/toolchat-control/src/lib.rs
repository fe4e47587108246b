//! Conversation orchestration for tool-augmented chat.
//!
//! This crate drives a conversation with a streaming chat endpoint: it
//! frames the event stream, merges tool-call fragments, gates tool
//! execution behind confirmation, feeds results back to the model with a
//! bounded retry budget, and keeps the transcript persisted.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Front end (CLI / UI)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  ▲ SessionEvent
//!                              ▼  │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ChatSession                          │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Stream    │ │  Tool-call  │ │     Lifecycle       │    │
//! │  │   Decoder   │ │ Accumulator │ │   State Machine     │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Execution  │ │  Feedback   │ │   Cancellation      │    │
//! │  │    Gate     │ │    Loop     │ │   Controller        │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │  Model   │   │   Tool   │
//!        │ (RocksDB)│   │ endpoint │   │  target  │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use toolchat_control::{
//!     ChatConfig, ChatSession, HttpModelClient, HttpToolExecutor, TurnOutcome,
//! };
//! use toolchat_core::SessionId;
//! use toolchat_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ChatConfig::default();
//! let store = Arc::new(RocksStore::open("/tmp/toolchat")?);
//! let model = Arc::new(HttpModelClient::new(&config)?);
//! let tools = Arc::new(HttpToolExecutor::new(&config)?);
//!
//! let mut session = ChatSession::open(store, SessionId::generate(), model, tools, config, None)?;
//! if let TurnOutcome::AwaitingConfirmation(call) = session.send_message("List the users").await? {
//!     println!("model wants to call {}", call.label());
//!     session.execute_pending().await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # State Machine
//!
//! - `Idle` → `Streaming` on a new message
//! - `Streaming` → `Idle` when the response completes, fails, or is cancelled
//! - `Streaming` → `ToolCallsDetected` → `AwaitingExecution` on a tool call
//! - `AwaitingExecution` → `Executing` on confirmation, or `Idle` on dismissal
//! - `Executing` → `Streaming` with the result, or `Idle` once retries run out
//!
//! See the [`lifecycle`] module for the transition function.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accumulator;
pub mod cancel;
pub mod classify;
pub mod error;
pub mod feedback;
pub mod gate;
pub mod lifecycle;
pub mod model_client;
pub mod openapi;
pub mod service;
pub mod stream;
pub mod tool_client;
pub mod types;

pub use accumulator::{CompletedToolCall, ToolCallAccumulator};
pub use cancel::Canceller;
pub use classify::{classify, ClassifiedError, ErrorKind};
pub use error::{ControlError, Result};
pub use feedback::{
    ExecutionResult, OutboundMessage, RetryDecision, RetryState, MAX_TOOL_RETRIES,
};
pub use gate::{PendingToolCall, ToolEdit, ToolRequest};
pub use lifecycle::{Effect, Phase, Transition, Trigger};
pub use model_client::{ByteStream, ChatRequest, HttpModelClient, ModelClient};
pub use service::{ChatSession, SessionEvent, TurnOutcome, EMPTY_RESPONSE_FALLBACK};
pub use stream::{FinishReason, SseDecoder, StreamEvent};
pub use tool_client::{HttpToolExecutor, ToolExecutor};
pub use types::{ChatConfig, LlmSettings, ToolSettings};
