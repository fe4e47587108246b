//! Chat session service.
//!
//! `ChatSession` owns one conversation: its transcript, its phase in the
//! state machine, the pending tool call and the retry counter. Each public
//! operation feeds a trigger to [`lifecycle::next`] and carries out the
//! returned effects, persisting the transcript after every step.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use toolchat_core::{MessageId, SessionId};
use toolchat_store::{Message, Transcript, TranscriptStore};

use crate::accumulator::{CompletedToolCall, ToolCallAccumulator};
use crate::cancel::Canceller;
use crate::classify::{classify, ClassifiedError};
use crate::error::{ControlError, Result};
use crate::feedback::{
    project_outbound, retries_exhausted_message, tool_result_message, ExecutionResult,
    RetryDecision, RetryState,
};
use crate::gate::{PendingToolCall, ToolEdit};
use crate::lifecycle::{self, Effect, Phase, Trigger};
use crate::model_client::{ChatRequest, ModelClient};
use crate::stream::{decode_stream, FinishReason, StreamEvent};
use crate::tool_client::ToolExecutor;
use crate::types::ChatConfig;

/// Text recorded when a stream completes without any content.
pub const EMPTY_RESPONSE_FALLBACK: &str = "Sorry, I couldn't get a response.";

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model answered with text.
    Completed,
    /// The model proposed a tool call that waits for confirmation.
    AwaitingConfirmation(PendingToolCall),
    /// The model request failed.
    Failed(ClassifiedError),
    /// The tool failed too many times in a row.
    RetriesExhausted,
    /// The user cancelled the in-flight request.
    Cancelled,
}

/// Progress notifications for a front end.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session moved to a new phase.
    PhaseChanged(Phase),
    /// A model stream was opened, writing into the given message.
    StreamStarted(MessageId),
    /// A fragment of assistant text arrived.
    ContentDelta(String),
    /// A tool call is waiting for confirmation.
    ToolCallProposed(PendingToolCall),
    /// A tool call is being sent; carries its label.
    ToolCallExecuting(String),
    /// A tool call returned.
    ToolResult(ExecutionResult),
    /// A finished message was added to the transcript.
    MessageAppended(Message),
    /// A model request failed.
    Error(ClassifiedError),
    /// The turn ended and control is back with the user.
    TurnFinished(TurnOutcome),
}

/// How a single model stream ended.
enum StreamEnd {
    Completed,
    Cancelled,
    Failed(ClassifiedError),
    ToolCall(PendingToolCall),
}

/// Inputs consumed and outputs produced by the effects of one transition.
#[derive(Default)]
struct Step {
    proposal: Option<PendingToolCall>,
    error: Option<Message>,
    result: Option<ExecutionResult>,
    /// Set when the transition asked for a model stream.
    open_stream: bool,
}

/// One conversation with the model.
pub struct ChatSession<S, M, T>
where
    S: TranscriptStore,
    M: ModelClient,
    T: ToolExecutor,
{
    store: Arc<S>,
    session_id: SessionId,
    model: Arc<M>,
    tools: Arc<T>,
    config: ChatConfig,
    schema: Option<Value>,
    transcript: Transcript,
    phase: Phase,
    pending: Option<PendingToolCall>,
    streaming: Option<MessageId>,
    retry: RetryState,
    canceller: Canceller,
    events: Option<mpsc::Sender<SessionEvent>>,
}

impl<S, M, T> ChatSession<S, M, T>
where
    S: TranscriptStore,
    M: ModelClient,
    T: ToolExecutor,
{
    /// Open a session, restoring its persisted transcript.
    ///
    /// Empty assistant messages left behind by an interrupted stream are
    /// dropped on load.
    ///
    /// # Errors
    ///
    /// Returns an error if the transcript cannot be loaded.
    pub fn open(
        store: Arc<S>,
        session_id: SessionId,
        model: Arc<M>,
        tools: Arc<T>,
        config: ChatConfig,
        events: Option<mpsc::Sender<SessionEvent>>,
    ) -> Result<Self> {
        let messages: Vec<Message> = store
            .load_transcript(&session_id)?
            .into_iter()
            .filter(|m| !is_empty_placeholder(m))
            .collect();

        tracing::info!(
            session_id = %session_id,
            messages = messages.len(),
            "Opened chat session"
        );

        Ok(Self {
            store,
            session_id,
            model,
            tools,
            config,
            schema: None,
            transcript: Transcript::from_messages(messages),
            phase: Phase::Idle,
            pending: None,
            streaming: None,
            retry: RetryState::new(),
            canceller: Canceller::new(),
            events,
        })
    }

    /// Attach the `OpenAPI` document describing the tool target.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Replace or remove the `OpenAPI` document.
    pub fn set_schema(&mut self, schema: Option<Value>) {
        self.schema = schema;
    }

    /// The attached `OpenAPI` document.
    #[must_use]
    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Session identifier.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// All messages of the conversation, including those beyond the
    /// persisted window.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    /// Consecutive failed tool executions so far.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry.count()
    }

    /// Handle for cancelling the in-flight model request from elsewhere.
    #[must_use]
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Cancel the in-flight model request, if any.
    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    /// The tool call waiting for confirmation.
    #[must_use]
    pub const fn pending_tool_call(&self) -> Option<&PendingToolCall> {
        self.pending.as_ref()
    }

    /// Apply an edit to the pending tool call.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoPendingToolCall` if nothing is pending.
    pub fn edit_pending(&mut self, edit: ToolEdit) -> Result<()> {
        let pending = self
            .pending
            .as_mut()
            .ok_or(ControlError::NoPendingToolCall)?;
        pending.apply(edit);
        tracing::debug!(session_id = %self.session_id, call = %pending.label(), "Edited pending tool call");
        Ok(())
    }

    /// Send a user message and run the turn to completion.
    ///
    /// The turn ends when the model answers with text, proposes a tool call
    /// that needs confirmation, fails, runs out of tool retries, or is
    /// cancelled. With auto-execution enabled, proposed tool calls are run
    /// and fed back without stopping.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::EmptyMessage` for blank input,
    /// `ControlError::InvalidTransition` while a tool call is executing, or a
    /// storage error.
    pub async fn send_message(&mut self, text: &str) -> Result<TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ControlError::EmptyMessage);
        }
        lifecycle::validate_transition(self.phase, Trigger::Send)?;

        self.retry.reset();
        let user = Message::user(text);
        self.transcript.add(user.clone());
        self.emit(SessionEvent::MessageAppended(user)).await;

        let mut step = Step::default();
        self.fire(Trigger::Send, &mut step).await?;
        let outcome = self.drive(step.open_stream).await?;
        Ok(self.finish_turn(outcome).await)
    }

    /// Execute the pending tool call and continue the turn.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoPendingToolCall` if nothing is pending.
    pub async fn execute_pending(&mut self) -> Result<TurnOutcome> {
        if self.pending.is_none() {
            return Err(ControlError::NoPendingToolCall);
        }
        let open_stream = self.run_tool(Trigger::Confirm).await?;
        let outcome = self.drive(open_stream).await?;
        Ok(self.finish_turn(outcome).await)
    }

    /// Discard the pending tool call without executing it.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NoPendingToolCall` if nothing is pending.
    pub async fn dismiss_pending(&mut self) -> Result<()> {
        if self.pending.is_none() {
            return Err(ControlError::NoPendingToolCall);
        }
        self.fire(Trigger::Dismiss, &mut Step::default()).await
    }

    /// Forget the conversation and reset the session to idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted transcript cannot be removed.
    pub async fn clear_history(&mut self) -> Result<()> {
        self.canceller.cancel();
        self.canceller.finish();
        self.transcript.clear();
        self.pending = None;
        self.streaming = None;
        self.retry.reset();
        self.set_phase(Phase::Idle).await;

        match self.store.delete_transcript(&self.session_id) {
            Ok(()) | Err(toolchat_store::StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(session_id = %self.session_id, "Cleared chat history");
        Ok(())
    }

    // =========================================================================
    // Turn driver
    // =========================================================================

    /// Stream model responses for as long as transitions ask for a stream.
    ///
    /// Only a tool run whose retries ran out settles without requesting
    /// another stream.
    async fn drive(&mut self, mut open_stream: bool) -> Result<TurnOutcome> {
        while open_stream {
            match self.stream_once().await? {
                StreamEnd::Completed => return Ok(TurnOutcome::Completed),
                StreamEnd::Cancelled => return Ok(TurnOutcome::Cancelled),
                StreamEnd::Failed(err) => return Ok(TurnOutcome::Failed(err)),
                StreamEnd::ToolCall(pending) => {
                    if !self.config.tools.auto_execute {
                        return Ok(TurnOutcome::AwaitingConfirmation(pending));
                    }
                    open_stream = self.run_tool(Trigger::AutoExecute).await?;
                }
            }
        }
        Ok(TurnOutcome::RetriesExhausted)
    }

    /// Read one model response into the transcript.
    async fn stream_once(&mut self) -> Result<StreamEnd> {
        let request = ChatRequest::new(
            project_outbound(self.transcript.messages()),
            self.schema.clone(),
            self.config.tools.enable_tools,
        );

        let token = self.canceller.begin();
        let stream_id = MessageId::generate();
        self.streaming = Some(stream_id);
        self.transcript.add(Message::placeholder(stream_id));
        self.persist()?;
        self.emit(SessionEvent::StreamStarted(stream_id)).await;

        let model = Arc::clone(&self.model);
        let opened = tokio::select! {
            biased;
            () = token.cancelled() => None,
            opened = model.open_stream(&request) => Some(opened),
        };
        let bytes = match opened {
            None => return self.end_cancelled().await,
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                let message = format!("Error: {e}");
                return self.end_failed(&message, e.response_text()).await;
            }
        };

        let mut events = std::pin::pin!(decode_stream(bytes));
        let mut content = String::new();
        let mut accumulator = ToolCallAccumulator::new();

        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => None,
                next = events.next() => Some(next),
            };
            let Some(next) = next else {
                return self.end_cancelled().await;
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    let message = format!("Error: {e}");
                    return self.end_failed(&message, e.response_text()).await;
                }
                None => return self.end_completed().await,
            };

            let terminal = event.is_terminal();
            match event {
                StreamEvent::Error { error, details } => {
                    let message = match details {
                        Some(details) => format!("Error: {error}: {details}"),
                        None => format!("Error: {error}"),
                    };
                    return self.end_failed(&message, None).await;
                }
                StreamEvent::Content(text) => {
                    content.push_str(&text);
                    self.transcript.update_streaming(stream_id, &content);
                    self.persist()?;
                    self.emit(SessionEvent::ContentDelta(text)).await;
                }
                StreamEvent::ToolCallDelta(delta) => accumulator.apply(&delta),
                StreamEvent::Finish(FinishReason::ToolCalls) => {
                    if let Some(call) = accumulator.finalize() {
                        return self.end_tool_call(&call).await;
                    }
                    tracing::debug!(session_id = %self.session_id, "tool_calls finish without fragments");
                }
                StreamEvent::Finish(FinishReason::Stop) | StreamEvent::Done => {}
            }
            if terminal {
                return self.end_completed().await;
            }
        }
    }

    async fn finish_turn(&self, outcome: TurnOutcome) -> TurnOutcome {
        tracing::debug!(session_id = %self.session_id, outcome = ?outcome, "Turn finished");
        self.emit(SessionEvent::TurnFinished(outcome.clone())).await;
        outcome
    }

    async fn end_completed(&mut self) -> Result<StreamEnd> {
        self.canceller.finish();
        self.fire(Trigger::StreamCompleted, &mut Step::default())
            .await?;
        Ok(StreamEnd::Completed)
    }

    async fn end_cancelled(&mut self) -> Result<StreamEnd> {
        self.canceller.finish();
        tracing::info!(session_id = %self.session_id, "Model request cancelled");
        self.fire(Trigger::Cancel, &mut Step::default()).await?;
        Ok(StreamEnd::Cancelled)
    }

    async fn end_failed(&mut self, message: &str, response_text: Option<&str>) -> Result<StreamEnd> {
        self.canceller.finish();
        let err = classify(message, response_text);
        tracing::warn!(
            session_id = %self.session_id,
            kind = ?err.kind,
            error = %message,
            "Model request failed"
        );
        self.emit(SessionEvent::Error(err.clone())).await;

        let mut step = Step {
            error: Some(Message::error(MessageId::generate(), err.transcript_text())),
            ..Step::default()
        };
        self.fire(Trigger::StreamFailed, &mut step).await?;
        Ok(StreamEnd::Failed(err))
    }

    async fn end_tool_call(&mut self, call: &CompletedToolCall) -> Result<StreamEnd> {
        self.canceller.finish();
        let pending = PendingToolCall::from_completed(call);
        tracing::info!(
            session_id = %self.session_id,
            call_id = %pending.call_id,
            call = %pending.label(),
            "Model proposed tool call"
        );

        self.fire(Trigger::ToolCallsDetected, &mut Step::default())
            .await?;
        let mut step = Step {
            proposal: Some(pending.clone()),
            ..Step::default()
        };
        self.fire(Trigger::ProposalPresented, &mut step).await?;
        Ok(StreamEnd::ToolCall(pending))
    }

    /// Execute the pending tool call and record the result.
    ///
    /// Returns true if the follow-up transition asked for a model stream.
    async fn run_tool(&mut self, trigger: Trigger) -> Result<bool> {
        let mut step = Step::default();
        self.fire(trigger, &mut step).await?;
        let result = step
            .result
            .take()
            .ok_or_else(|| ControlError::Internal("tool execution produced no result".into()))?;

        let decision = self.retry.record(&result);
        let mut step = Step {
            result: Some(result),
            ..Step::default()
        };
        match decision {
            RetryDecision::Continue => self.fire(Trigger::ToolResultAccepted, &mut step).await?,
            RetryDecision::Exhausted => {
                tracing::warn!(
                    session_id = %self.session_id,
                    retries = self.retry.count(),
                    "Tool retries exhausted"
                );
                step.error = step.result.as_ref().map(retries_exhausted_message);
                self.fire(Trigger::RetriesExhausted, &mut step).await?;
            }
        }
        Ok(step.open_stream)
    }

    // =========================================================================
    // Effects
    // =========================================================================

    /// Apply a trigger, carry out its effects and persist.
    async fn fire(&mut self, trigger: Trigger, step: &mut Step) -> Result<()> {
        let transition = lifecycle::next(self.phase, trigger)?;
        tracing::debug!(
            session_id = %self.session_id,
            from = ?self.phase,
            to = ?transition.to,
            trigger = ?trigger,
            "Session transition"
        );
        self.set_phase(transition.to).await;

        for effect in transition.effects {
            match effect {
                Effect::AbortInFlight => {
                    self.canceller.cancel();
                }
                Effect::OpenStream => step.open_stream = true,
                Effect::FinalizeContent => {
                    let cancelled = matches!(trigger, Trigger::Cancel | Trigger::Send);
                    self.finalize_content(cancelled).await;
                }
                Effect::RemovePlaceholder => {
                    if let Some(id) = self.streaming.take() {
                        self.transcript.remove(id);
                    }
                }
                Effect::PresentProposal => {
                    self.pending = step.proposal.take();
                    if let Some(pending) = &self.pending {
                        self.emit(SessionEvent::ToolCallProposed(pending.clone())).await;
                    }
                }
                Effect::DiscardProposal => {
                    if let Some(pending) = self.pending.take() {
                        tracing::debug!(session_id = %self.session_id, call = %pending.label(), "Discarded tool call");
                    }
                }
                Effect::AppendToolCallMessage => {
                    let pending = self
                        .pending
                        .as_ref()
                        .ok_or(ControlError::NoPendingToolCall)?;
                    let message = pending.to_message(MessageId::generate());
                    self.append(message).await;
                }
                Effect::ExecuteTool => {
                    step.result = Some(self.execute_tool().await?);
                }
                Effect::AppendToolResult => {
                    let pending = self.pending.take();
                    if let Some(result) = &step.result {
                        let call_id = pending.as_ref().map(|p| p.call_id.as_str());
                        let message = tool_result_message(call_id, result);
                        self.append(message).await;
                    }
                }
                Effect::AppendError => {
                    if let Some(message) = step.error.take() {
                        self.append(message).await;
                    }
                }
            }
        }

        self.persist()
    }

    /// Settle the streaming message.
    ///
    /// Text already streamed stays as it is. An empty message becomes the
    /// fallback text, or is removed when the stream was cancelled.
    async fn finalize_content(&mut self, cancelled: bool) {
        let Some(id) = self.streaming.take() else {
            return;
        };
        let content = self
            .transcript
            .get(id)
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        if !content.is_empty() {
            if let Some(message) = self.transcript.get(id).cloned() {
                self.emit(SessionEvent::MessageAppended(message)).await;
            }
        } else if cancelled {
            self.transcript.remove(id);
        } else {
            self.transcript
                .add(Message::assistant(id, EMPTY_RESPONSE_FALLBACK));
            if let Some(message) = self.transcript.get(id).cloned() {
                self.emit(SessionEvent::MessageAppended(message)).await;
            }
        }
    }

    async fn execute_tool(&self) -> Result<ExecutionResult> {
        let pending = self
            .pending
            .as_ref()
            .ok_or(ControlError::NoPendingToolCall)?;
        self.emit(SessionEvent::ToolCallExecuting(pending.label()))
            .await;

        let result = match pending.to_request(
            &self.config.tools,
            &self.config.llm,
            self.schema.as_ref(),
        ) {
            Ok(request) => {
                tracing::info!(
                    session_id = %self.session_id,
                    method = %request.method,
                    url = %request.url,
                    "Executing tool call"
                );
                self.tools.execute(&request).await
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "Tool call rejected");
                ExecutionResult::network_error(e.to_string())
            }
        };

        self.emit(SessionEvent::ToolResult(result.clone())).await;
        Ok(result)
    }

    async fn append(&mut self, message: Message) {
        self.transcript.add(message.clone());
        self.emit(SessionEvent::MessageAppended(message)).await;
    }

    async fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            self.phase = phase;
            self.emit(SessionEvent::PhaseChanged(phase)).await;
        }
    }

    fn persist(&self) -> Result<()> {
        self.store
            .save_transcript(&self.session_id, self.transcript.messages())?;
        Ok(())
    }

    async fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            if events.send(event).await.is_err() {
                tracing::trace!(session_id = %self.session_id, "Event receiver dropped");
            }
        }
    }
}

fn is_empty_placeholder(message: &Message) -> bool {
    message.role == toolchat_store::Role::Assistant
        && !message.has_tool_calls()
        && message.content.as_deref().is_some_and(str::is_empty)
}
