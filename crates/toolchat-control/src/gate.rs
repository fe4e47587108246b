//! Execution gate for proposed tool calls.
//!
//! A finalized tool call becomes a [`PendingToolCall`]: editable method,
//! path, path parameters, query parameters and body, pre-populated from the
//! model's arguments. On confirmation the gate resolves it into a concrete
//! [`ToolRequest`]. The edited arguments are authoritative: they are what
//! gets executed and what the transcript records.

use serde_json::{json, Map, Value};
use toolchat_core::MessageId;
use toolchat_store::{Message, ToolCall};

use crate::accumulator::CompletedToolCall;
use crate::error::{ControlError, Result};
use crate::openapi;
use crate::types::{LlmSettings, ToolSettings};

/// The tool call currently awaiting human action.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingToolCall {
    /// Identifier of the originating call.
    pub call_id: String,
    /// Function the model invoked.
    pub function_name: String,
    /// HTTP method, upper case.
    pub method: String,
    /// Path template with `{name}` placeholders.
    pub path: String,
    /// Values substituted into the path template.
    pub path_params: Map<String, Value>,
    /// Values appended as the query string.
    pub query_params: Map<String, Value>,
    /// JSON request body, sent for POST only.
    pub body: Value,
}

/// A single edit to a pending tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEdit {
    /// Replace the HTTP method.
    Method(String),
    /// Replace the path template.
    Path(String),
    /// Replace the path parameters.
    PathParams(Map<String, Value>),
    /// Replace the query parameters.
    QueryParams(Map<String, Value>),
    /// Replace the body.
    Body(Value),
}

impl ToolEdit {
    /// Parse an edit from a field name and its textual value.
    ///
    /// `method` and `path` take plain text; `params`, `query` and `body`
    /// take JSON.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidToolCall` for an unknown field or a
    /// value that is not the expected JSON shape.
    pub fn parse(field: &str, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match field {
            "method" => Ok(Self::Method(raw.to_string())),
            "path" => Ok(Self::Path(raw.to_string())),
            "params" | "path_params" => parse_object(raw).map(Self::PathParams),
            "query" | "query_params" => parse_object(raw).map(Self::QueryParams),
            "body" => serde_json::from_str(raw)
                .map(Self::Body)
                .map_err(|e| ControlError::InvalidToolCall(format!("body is not JSON: {e}"))),
            other => Err(ControlError::InvalidToolCall(format!(
                "unknown field: {other}"
            ))),
        }
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ControlError::InvalidToolCall(
            "expected a JSON object".to_string(),
        )),
        Err(e) => Err(ControlError::InvalidToolCall(format!("invalid JSON: {e}"))),
    }
}

fn object_field(args: &Map<String, Value>, key: &str) -> Map<String, Value> {
    match args.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

/// Text form of a parameter value as it appears in a URL.
fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(param_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

impl PendingToolCall {
    /// Build the editable proposal from a finalized tool call.
    ///
    /// Missing fields default to `GET`, an empty path and empty containers.
    #[must_use]
    pub fn from_completed(call: &CompletedToolCall) -> Self {
        let args = &call.arguments;
        let method = args
            .get("method")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_uppercase();
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self {
            call_id: call.id.clone(),
            function_name: call.function_name.clone(),
            method,
            path,
            path_params: object_field(args, "path_params"),
            query_params: object_field(args, "query_params"),
            body: args
                .get("body")
                .filter(|b| b.is_object())
                .cloned()
                .unwrap_or_else(|| json!({})),
        }
    }

    /// Apply one edit.
    pub fn apply(&mut self, edit: ToolEdit) {
        match edit {
            ToolEdit::Method(method) => {
                self.method = if method.is_empty() {
                    "GET".to_string()
                } else {
                    method.to_uppercase()
                };
            }
            ToolEdit::Path(path) => self.path = path,
            ToolEdit::PathParams(params) => self.path_params = params,
            ToolEdit::QueryParams(params) => self.query_params = params,
            ToolEdit::Body(body) => self.body = body,
        }
    }

    /// Returns true if the request carries a body.
    #[must_use]
    pub fn sends_body(&self) -> bool {
        self.method == "POST"
    }

    /// The arguments as executed: method, path, both parameter maps, and
    /// the body for POST.
    #[must_use]
    pub fn executed_args(&self) -> Value {
        let mut args = json!({
            "method": self.method,
            "path": self.path,
            "query_params": self.query_params,
            "path_params": self.path_params,
        });
        if self.sends_body() {
            args["body"] = self.body.clone();
        }
        args
    }

    /// Short human-readable label, e.g. `api_request(GET /items)`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}({} {})", self.tool_name(), self.method, self.path)
    }

    fn tool_name(&self) -> &str {
        if self.function_name.is_empty() {
            openapi::TOOL_NAME
        } else {
            &self.function_name
        }
    }

    /// The assistant message recorded just before execution.
    #[must_use]
    pub fn to_message(&self, message_id: MessageId) -> Message {
        let call = ToolCall::function(
            &self.call_id,
            self.tool_name(),
            self.executed_args().to_string(),
        );
        Message::tool_call(message_id, call).with_display(format!("Tool call: {}", self.label()))
    }

    /// Path with placeholders substituted and the query string appended.
    ///
    /// Each `{key}` placeholder is replaced once by the URL-encoded value.
    #[must_use]
    pub fn resolved_path(&self) -> String {
        let mut url = self.path.clone();
        for (key, value) in &self.path_params {
            let placeholder = format!("{{{key}}}");
            url = url.replacen(&placeholder, &urlencoding::encode(&param_text(value)), 1);
        }

        if !self.query_params.is_empty() {
            let query = self
                .query_params
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}={}",
                        urlencoding::encode(k),
                        urlencoding::encode(&param_text(v))
                    )
                })
                .collect::<Vec<_>>()
                .join("&");
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }
        url
    }

    /// Resolve the proposal into a concrete HTTP request.
    ///
    /// `X-LLM-*` headers are attached only when `schema` declares them for
    /// the endpoint; `Authorization` only when a tool API key is configured.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidToolCall` if the method is not a valid
    /// HTTP method.
    pub fn to_request(
        &self,
        tools: &ToolSettings,
        llm: &LlmSettings,
        schema: Option<&Value>,
    ) -> Result<ToolRequest> {
        let method = reqwest::Method::from_bytes(self.method.as_bytes())
            .map_err(|_| ControlError::InvalidToolCall(format!("invalid method: {}", self.method)))?;

        let path = self.resolved_path();
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path
        } else {
            let base = tools.base_url.trim_end_matches('/');
            if path.starts_with('/') {
                format!("{base}{path}")
            } else {
                format!("{base}/{path}")
            }
        };

        let mut headers = Vec::new();
        if schema.is_some_and(|s| openapi::endpoint_needs_llm_headers(s, &self.path)) {
            headers.extend(
                llm.non_empty_headers()
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value)),
            );
        }
        if let Some(key) = tools.api_key.as_deref().filter(|k| !k.is_empty()) {
            headers.push(("Authorization".to_string(), format!("Bearer {key}")));
        }

        let body = if self.sends_body() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
            Some(self.body.to_string())
        } else {
            None
        };

        Ok(ToolRequest {
            method,
            url,
            headers,
            body,
        })
    }
}

/// A fully resolved tool HTTP request.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    /// HTTP method.
    pub method: reqwest::Method,
    /// Absolute URL.
    pub url: String,
    /// Headers to send.
    pub headers: Vec<(String, String)>,
    /// Serialized JSON body.
    pub body: Option<String>,
}

impl ToolRequest {
    /// Value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
