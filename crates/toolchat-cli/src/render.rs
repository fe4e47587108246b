//! Terminal rendering of session events and transcript entries.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use toolchat_control::{
    ClassifiedError, ExecutionResult, PendingToolCall, SessionEvent, ToolRequest, TurnOutcome,
};
use toolchat_store::{Message, Role};

/// Characters of a tool result body shown inline.
const RESULT_PREVIEW_CHARS: usize = 300;

/// Headers whose values are masked in request previews.
const SECRET_HEADERS: [&str; 2] = ["authorization", "x-llm-api-key"];

/// Writes session progress to a terminal.
pub struct Renderer<W: Write> {
    out: W,
    /// True while assistant text is being printed on the current line.
    streaming: bool,
    /// Classification of the last model failure, shown with its message.
    last_error: Option<ClassifiedError>,
}

impl<W: Write> Renderer<W> {
    /// Create a renderer writing to `out`.
    pub const fn new(out: W) -> Self {
        Self {
            out,
            streaming: false,
            last_error: None,
        }
    }

    /// Render one session event.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the output fails.
    pub fn event(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::PhaseChanged(phase) => {
                tracing::trace!(phase = ?phase, "Phase changed");
            }
            SessionEvent::StreamStarted(_) => self.streaming = false,
            SessionEvent::ContentDelta(text) => {
                if !self.streaming {
                    write!(self.out, "assistant> ")?;
                    self.streaming = true;
                }
                write!(self.out, "{text}")?;
                self.out.flush()?;
            }
            SessionEvent::ToolCallProposed(pending) => {
                self.end_line()?;
                writeln!(self.out, "{}", format_pending(pending))?;
                writeln!(self.out, "  /exec to run, /edit to change, /dismiss to skip")?;
            }
            SessionEvent::ToolCallExecuting(label) => {
                self.end_line()?;
                writeln!(self.out, "-> {label}")?;
            }
            SessionEvent::ToolResult(result) => {
                writeln!(self.out, "{}", format_result(result))?;
            }
            SessionEvent::MessageAppended(message) => self.message_appended(message)?,
            SessionEvent::Error(err) => self.last_error = Some(err.clone()),
            SessionEvent::TurnFinished(outcome) => {
                self.end_line()?;
                if matches!(outcome, TurnOutcome::Cancelled) {
                    writeln!(self.out, "[cancelled]")?;
                }
            }
        }
        Ok(())
    }

    fn message_appended(&mut self, message: &Message) -> io::Result<()> {
        if message.role != Role::Assistant || message.has_tool_calls() {
            return Ok(());
        }
        if message.is_error {
            self.end_line()?;
            writeln!(self.out, "error> {}", message.display_text())?;
            if let Some(err) = self.last_error.take() {
                if let Some(details) = &err.details {
                    writeln!(self.out, "  details: {details}")?;
                }
                if let Some(action) = err.action() {
                    writeln!(
                        self.out,
                        "  {action}: review --llm-base-url, --llm-api-key and --model"
                    )?;
                }
            }
        } else if !self.streaming {
            // Text that never streamed, such as the empty-response fallback.
            writeln!(self.out, "assistant> {}", message.display_text())?;
        } else {
            self.end_line()?;
        }
        Ok(())
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.streaming {
            writeln!(self.out)?;
            self.streaming = false;
        }
        Ok(())
    }

    /// Write a line of plain text.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the output fails.
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        self.end_line()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    /// Print the transcript.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to the output fails.
    pub fn history(&mut self, messages: &[Message]) -> io::Result<()> {
        self.end_line()?;
        if messages.is_empty() {
            writeln!(self.out, "(no messages)")?;
        }
        for message in messages {
            writeln!(self.out, "{}", format_message(message))?;
        }
        self.out.flush()
    }

    /// Consume the renderer and return the writer.
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Multi-line description of a pending tool call.
#[must_use]
pub fn format_pending(pending: &PendingToolCall) -> String {
    let mut text = format!("tool> {}", pending.label());
    if !pending.path_params.is_empty() {
        text.push_str(&format!(
            "\n  params: {}",
            serde_json::Value::Object(pending.path_params.clone())
        ));
    }
    if !pending.query_params.is_empty() {
        text.push_str(&format!(
            "\n  query:  {}",
            serde_json::Value::Object(pending.query_params.clone())
        ));
    }
    if pending.sends_body() {
        text.push_str(&format!("\n  body:   {}", pending.body));
    }
    text.push_str(&format!("\n  url:    {}", pending.resolved_path()));
    text
}

/// Request preview with secret header values masked.
#[must_use]
pub fn format_request(request: &ToolRequest) -> String {
    let mut text = format!("{} {}", request.method, request.url);
    for (name, value) in &request.headers {
        let shown = if SECRET_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            mask(value)
        } else {
            value.clone()
        };
        text.push_str(&format!("\n  {name}: {shown}"));
    }
    if let Some(body) = &request.body {
        text.push_str(&format!("\n\n{body}"));
    }
    text
}

fn format_result(result: &ExecutionResult) -> String {
    let mut text = format!("<- {} {}", result.status, result.status_text);
    if !result.body.is_empty() {
        text.push_str(&format!("\n  {}", excerpt(&result.body, RESULT_PREVIEW_CHARS)));
    }
    text
}

/// One transcript line: time, role and display text.
#[must_use]
pub fn format_message(message: &Message) -> String {
    let time = i64::try_from(message.message_id.millis())
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map_or_else(|| "--:--:--".to_string(), |t| t.format("%H:%M:%S").to_string());
    let role = if message.is_error {
        "error"
    } else {
        message.role.as_str()
    };
    format!("[{time}] {role:<9} {}", excerpt(message.display_text(), 2000))
}

/// First `max` characters of `text`, marked when cut.
#[must_use]
pub fn excerpt(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

fn mask(value: &str) -> String {
    if value.chars().count() <= 8 {
        return "****".to_string();
    }
    let visible: String = value.chars().take(4).collect();
    format!("{visible}****")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use toolchat_control::{
        CompletedToolCall, ErrorKind, LlmSettings, ToolSettings, EMPTY_RESPONSE_FALLBACK,
    };
    use toolchat_core::MessageId;

    fn pending(args: serde_json::Value) -> PendingToolCall {
        PendingToolCall::from_completed(&CompletedToolCall {
            id: "call_1".to_string(),
            function_name: "api_request".to_string(),
            arguments_text: args.to_string(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        })
    }

    fn rendered(events: &[SessionEvent]) -> String {
        let mut renderer = Renderer::new(Vec::new());
        for event in events {
            renderer.event(event).unwrap();
        }
        String::from_utf8(renderer.into_inner()).unwrap()
    }

    #[test]
    fn streamed_text_on_one_line() {
        let id = MessageId::generate();
        let out = rendered(&[
            SessionEvent::StreamStarted(id),
            SessionEvent::ContentDelta("Hel".to_string()),
            SessionEvent::ContentDelta("lo".to_string()),
            SessionEvent::MessageAppended(Message::assistant(id, "Hello")),
            SessionEvent::TurnFinished(TurnOutcome::Completed),
        ]);
        assert_eq!(out, "assistant> Hello\n");
    }

    #[test]
    fn fallback_text_is_printed() {
        let id = MessageId::generate();
        let out = rendered(&[
            SessionEvent::StreamStarted(id),
            SessionEvent::MessageAppended(Message::assistant(id, EMPTY_RESPONSE_FALLBACK)),
        ]);
        assert_eq!(out, format!("assistant> {EMPTY_RESPONSE_FALLBACK}\n"));
    }

    #[test]
    fn error_with_settings_hint() {
        let err = ClassifiedError {
            kind: ErrorKind::Authentication,
            title: "Authentication Failed".to_string(),
            message: "Check your API key.".to_string(),
            details: Some("invalid key".to_string()),
        };
        let out = rendered(&[
            SessionEvent::Error(err.clone()),
            SessionEvent::MessageAppended(Message::error(
                MessageId::generate(),
                err.transcript_text(),
            )),
        ]);
        assert!(out.starts_with("error> Authentication Failed: Check your API key.\n"));
        assert!(out.contains("  details: invalid key\n"));
        assert!(out.contains("Check Settings:"));
    }

    #[test]
    fn cancelled_turn_is_marked() {
        let out = rendered(&[
            SessionEvent::ContentDelta("Think".to_string()),
            SessionEvent::TurnFinished(TurnOutcome::Cancelled),
        ]);
        assert_eq!(out, "assistant> Think\n[cancelled]\n");
    }

    #[test]
    fn pending_description() {
        let text = format_pending(&pending(json!({
            "method": "POST",
            "path": "/users/{id}",
            "path_params": {"id": 7},
            "body": {"name": "a"}
        })));
        assert!(text.starts_with("tool> api_request(POST /users/{id})"));
        assert!(text.contains("params: {\"id\":7}"));
        assert!(text.contains("body:   {\"name\":\"a\"}"));
        assert!(text.ends_with("url:    /users/7"));
    }

    #[test]
    fn request_preview_masks_secrets() {
        let call = pending(json!({"method": "GET", "path": "/items"}));
        let tools = ToolSettings {
            api_key: Some("tool-secret-value".to_string()),
            ..ToolSettings::default()
        };
        let request = call
            .to_request(&tools, &LlmSettings::default(), None)
            .unwrap();
        let text = format_request(&request);
        assert!(text.starts_with("GET http://localhost:8000/items"));
        assert!(text.contains("Authorization: Bear****"));
        assert!(!text.contains("tool-secret-value"));
    }

    #[test]
    fn message_line() {
        let message = Message::user("hello there");
        let line = format_message(&message);
        assert!(line.starts_with('['));
        assert!(line.ends_with("user      hello there"));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé...");
        assert_eq!(excerpt("short", 10), "short");
    }
}
