//! Session state machine.
//!
//! Every state change of a chat session goes through [`next`], a pure
//! function from the current phase and a trigger to the next phase and the
//! effects the session must carry out, in order.
//!
//! # State Machine
//!
//! ```text
//!          send                                    stream completed / failed / cancel
//!   ┌──────┐ ───────▶ ┌───────────┐ ───────────────────────────────────────────┐
//!   │ Idle │          │ Streaming │                                            │
//!   └──────┘ ◀─┐      └─────┬─────┘ ◀──────────────────────┐                   │
//!      ▲       │            │ (tool calls)                 │ (result accepted) │
//!      │       │            ▼                              │                   │
//!      │       │   ┌───────────────────┐          ┌────────┴──┐                │
//!      │       │   │ ToolCallsDetected │          │ Executing │                │
//!      │       │   └─────────┬─────────┘          └─────┬─────┘                │
//!      │       │             │ (presented)      ▲       │ (retries exhausted)  │
//!      │       │             ▼                  │       │                      │
//!      │       │   ┌───────────────────┐ confirm│       │                      │
//!      │       └───│ AwaitingExecution │────────┘       │                      │
//!      │  dismiss  └───────────────────┘                │                      │
//!      └────────────────────────────────────────────────┴──────────────────────┘
//! ```

use serde::Serialize;

use crate::error::{ControlError, Result};

/// Phase of a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// A model response is being read.
    Streaming,
    /// The model finished with a tool call that is being finalized.
    ToolCallsDetected,
    /// A tool call is waiting for confirmation.
    AwaitingExecution,
    /// A confirmed tool call is running.
    Executing,
}

/// Event that drives a phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// The user sent a message.
    Send,
    /// The stream finished with text.
    StreamCompleted,
    /// The stream finished with an error.
    StreamFailed,
    /// The stream finished with a tool call.
    ToolCallsDetected,
    /// The finalized tool call was handed to the user.
    ProposalPresented,
    /// The tool call is executed without confirmation.
    AutoExecute,
    /// The user confirmed the tool call.
    Confirm,
    /// The user dismissed the tool call.
    Dismiss,
    /// The user cancelled the in-flight request.
    Cancel,
    /// The tool result was appended and the retry budget allows another turn.
    ToolResultAccepted,
    /// The tool failed too many times in a row.
    RetriesExhausted,
}

/// A side effect requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    /// Abort the in-flight model request.
    AbortInFlight,
    /// Open a new model stream over the transcript.
    OpenStream,
    /// Keep the accumulated content as the final assistant message.
    FinalizeContent,
    /// Drop the streaming placeholder message.
    RemovePlaceholder,
    /// Hand the pending tool call to the user.
    PresentProposal,
    /// Drop the pending tool call.
    DiscardProposal,
    /// Record the executed tool call as an assistant message.
    AppendToolCallMessage,
    /// Send the tool request.
    ExecuteTool,
    /// Record the tool result message.
    AppendToolResult,
    /// Record an error message and end the turn.
    AppendError,
}

/// Result of applying a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Phase after the transition.
    pub to: Phase,
    /// Effects to carry out, in order.
    pub effects: Vec<Effect>,
}

impl Transition {
    fn new(to: Phase, effects: &[Effect]) -> Self {
        Self {
            to,
            effects: effects.to_vec(),
        }
    }
}

/// Compute the transition for `trigger` in phase `from`.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the trigger is not accepted
/// in `from`.
pub fn next(from: Phase, trigger: Trigger) -> Result<Transition> {
    use Effect::{
        AbortInFlight, AppendError, AppendToolCallMessage, AppendToolResult, DiscardProposal,
        ExecuteTool, FinalizeContent, OpenStream, PresentProposal, RemovePlaceholder,
    };
    use Phase::{AwaitingExecution, Executing, Idle, Streaming, ToolCallsDetected};

    let transition = match (from, trigger) {
        (Idle, Trigger::Send) => Transition::new(Streaming, &[OpenStream]),
        (Streaming, Trigger::Send) => {
            Transition::new(Streaming, &[AbortInFlight, FinalizeContent, OpenStream])
        }
        (AwaitingExecution, Trigger::Send) => {
            Transition::new(Streaming, &[DiscardProposal, OpenStream])
        }

        (Streaming, Trigger::StreamCompleted) => Transition::new(Idle, &[FinalizeContent]),
        (Streaming, Trigger::StreamFailed) => {
            Transition::new(Idle, &[RemovePlaceholder, AppendError])
        }
        (Streaming, Trigger::ToolCallsDetected) => {
            Transition::new(ToolCallsDetected, &[RemovePlaceholder])
        }
        (Streaming, Trigger::Cancel) => Transition::new(Idle, &[AbortInFlight, FinalizeContent]),

        (ToolCallsDetected, Trigger::ProposalPresented) => {
            Transition::new(AwaitingExecution, &[PresentProposal])
        }

        (AwaitingExecution, Trigger::Confirm | Trigger::AutoExecute) => {
            Transition::new(Executing, &[AppendToolCallMessage, ExecuteTool])
        }
        (AwaitingExecution, Trigger::Dismiss) => Transition::new(Idle, &[DiscardProposal]),

        (Executing, Trigger::ToolResultAccepted) => {
            Transition::new(Streaming, &[AppendToolResult, OpenStream])
        }
        (Executing, Trigger::RetriesExhausted) => {
            Transition::new(Idle, &[AppendToolResult, AppendError])
        }

        // Nothing in flight to abort.
        (Idle | AwaitingExecution, Trigger::Cancel) => Transition::new(from, &[]),

        _ => return Err(ControlError::InvalidTransition { from, trigger }),
    };

    tracing::trace!(from = ?from, trigger = ?trigger, to = ?transition.to, "Phase transition");
    Ok(transition)
}

/// Check if `trigger` is accepted in phase `from`.
#[must_use]
pub const fn is_valid_transition(from: Phase, trigger: Trigger) -> bool {
    use Phase::{AwaitingExecution, Executing, Idle, Streaming, ToolCallsDetected};

    matches!(
        (from, trigger),
        (Idle | Streaming | AwaitingExecution, Trigger::Send)
            | (
                Streaming,
                Trigger::StreamCompleted | Trigger::StreamFailed | Trigger::ToolCallsDetected
            )
            | (Idle | Streaming | AwaitingExecution, Trigger::Cancel)
            | (ToolCallsDetected, Trigger::ProposalPresented)
            | (
                AwaitingExecution,
                Trigger::Confirm | Trigger::AutoExecute | Trigger::Dismiss
            )
            | (Executing, Trigger::ToolResultAccepted | Trigger::RetriesExhausted)
    )
}

/// Validate a transition without computing its effects.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the trigger is not accepted.
pub fn validate_transition(from: Phase, trigger: Trigger) -> Result<()> {
    if is_valid_transition(from, trigger) {
        Ok(())
    } else {
        Err(ControlError::InvalidTransition { from, trigger })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_PHASES: [Phase; 5] = [
        Phase::Idle,
        Phase::Streaming,
        Phase::ToolCallsDetected,
        Phase::AwaitingExecution,
        Phase::Executing,
    ];

    const ALL_TRIGGERS: [Trigger; 11] = [
        Trigger::Send,
        Trigger::StreamCompleted,
        Trigger::StreamFailed,
        Trigger::ToolCallsDetected,
        Trigger::ProposalPresented,
        Trigger::AutoExecute,
        Trigger::Confirm,
        Trigger::Dismiss,
        Trigger::Cancel,
        Trigger::ToolResultAccepted,
        Trigger::RetriesExhausted,
    ];

    #[test]
    fn next_agrees_with_validation() {
        for from in ALL_PHASES {
            for trigger in ALL_TRIGGERS {
                assert_eq!(
                    next(from, trigger).is_ok(),
                    is_valid_transition(from, trigger),
                    "{from:?} + {trigger:?}"
                );
            }
        }
    }

    #[test]
    fn text_turn() {
        let t = next(Phase::Idle, Trigger::Send).unwrap();
        assert_eq!(t.to, Phase::Streaming);
        assert_eq!(t.effects, vec![Effect::OpenStream]);

        let t = next(Phase::Streaming, Trigger::StreamCompleted).unwrap();
        assert_eq!(t.to, Phase::Idle);
        assert_eq!(t.effects, vec![Effect::FinalizeContent]);
    }

    #[test]
    fn tool_turn_with_retry() {
        let t = next(Phase::Streaming, Trigger::ToolCallsDetected).unwrap();
        assert_eq!(t.to, Phase::ToolCallsDetected);
        assert_eq!(t.effects, vec![Effect::RemovePlaceholder]);

        let t = next(Phase::ToolCallsDetected, Trigger::ProposalPresented).unwrap();
        assert_eq!(t.to, Phase::AwaitingExecution);

        let t = next(Phase::AwaitingExecution, Trigger::Confirm).unwrap();
        assert_eq!(t.to, Phase::Executing);
        assert_eq!(
            t.effects,
            vec![Effect::AppendToolCallMessage, Effect::ExecuteTool]
        );

        let t = next(Phase::Executing, Trigger::ToolResultAccepted).unwrap();
        assert_eq!(t.to, Phase::Streaming);
        assert_eq!(t.effects, vec![Effect::AppendToolResult, Effect::OpenStream]);

        let t = next(Phase::Executing, Trigger::RetriesExhausted).unwrap();
        assert_eq!(t.to, Phase::Idle);
        assert_eq!(t.effects, vec![Effect::AppendToolResult, Effect::AppendError]);
    }

    #[test]
    fn send_aborts_in_flight_request() {
        let t = next(Phase::Streaming, Trigger::Send).unwrap();
        assert_eq!(
            t.effects,
            vec![Effect::AbortInFlight, Effect::FinalizeContent, Effect::OpenStream]
        );

        let t = next(Phase::AwaitingExecution, Trigger::Send).unwrap();
        assert_eq!(t.effects, vec![Effect::DiscardProposal, Effect::OpenStream]);
    }

    #[test]
    fn cancel_keeps_partial_content() {
        let t = next(Phase::Streaming, Trigger::Cancel).unwrap();
        assert_eq!(t.to, Phase::Idle);
        assert_eq!(t.effects, vec![Effect::AbortInFlight, Effect::FinalizeContent]);

        let t = next(Phase::Idle, Trigger::Cancel).unwrap();
        assert_eq!(t.to, Phase::Idle);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn invalid_transitions() {
        assert!(!is_valid_transition(Phase::Idle, Trigger::Confirm));
        assert!(!is_valid_transition(Phase::Executing, Trigger::Send));
        assert!(!is_valid_transition(Phase::Idle, Trigger::StreamCompleted));

        let err = validate_transition(Phase::Executing, Trigger::Dismiss).unwrap_err();
        assert!(matches!(
            err,
            ControlError::InvalidTransition {
                from: Phase::Executing,
                trigger: Trigger::Dismiss
            }
        ));
    }
}
