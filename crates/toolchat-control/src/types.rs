//! Configuration types for a chat session.
//!
//! `ChatConfig` can be deserialized from a JSON document; every field has a
//! default so partial documents are accepted.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Model provider settings forwarded to the chat endpoint as `X-LLM-*` headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Base URL of the model provider.
    #[serde(default)]
    pub base_url: String,
    /// Provider API key.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier.
    #[serde(default)]
    pub model_id: String,
    /// Completion token limit.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl LlmSettings {
    /// The `X-LLM-*` header set, with unset values rendered as `""`.
    #[must_use]
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("X-LLM-Base-Url", self.base_url.clone()),
            ("X-LLM-Api-Key", self.api_key.clone()),
            ("X-LLM-Model-Id", self.model_id.clone()),
            (
                "X-LLM-Max-Tokens",
                self.max_tokens.map(|v| v.to_string()).unwrap_or_default(),
            ),
            (
                "X-LLM-Temperature",
                self.temperature.map(|v| v.to_string()).unwrap_or_default(),
            ),
        ]
    }

    /// The `X-LLM-*` headers that carry a value.
    #[must_use]
    pub fn non_empty_headers(&self) -> Vec<(&'static str, String)> {
        self.headers()
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .collect()
    }
}

/// Tool-calling behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSettings {
    /// Offer the `api_request` tool to the model.
    #[serde(default)]
    pub enable_tools: bool,
    /// Execute proposed tool calls without waiting for confirmation.
    #[serde(default)]
    pub auto_execute: bool,
    /// Bearer token sent to tool targets, when set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Origin that tool paths are resolved against.
    #[serde(default = "ToolSettings::default_base_url")]
    pub base_url: String,
}

impl ToolSettings {
    fn default_base_url() -> String {
        "http://localhost:8000".to_string()
    }
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enable_tools: false,
            auto_execute: false,
            api_key: None,
            base_url: Self::default_base_url(),
        }
    }
}

/// Configuration for a chat session.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Streaming chat endpoint.
    #[serde(default = "ChatConfig::default_chat_url")]
    pub chat_url: String,

    /// Model provider settings.
    #[serde(default)]
    pub llm: LlmSettings,

    /// Tool-calling settings.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Total timeout for a tool request, in seconds.
    #[serde(default = "ChatConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Connect timeout for every outbound request, in seconds.
    #[serde(default = "ChatConfig::default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Capacity of the session event channel.
    #[serde(default = "ChatConfig::default_event_buffer")]
    pub event_buffer: usize,
}

impl ChatConfig {
    fn default_chat_url() -> String {
        "http://localhost:8000/llm-chat".to_string()
    }

    const fn default_request_timeout() -> u64 {
        120
    }

    const fn default_connect_timeout() -> u64 {
        10
    }

    const fn default_event_buffer() -> usize {
        128
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the connect timeout as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            chat_url: Self::default_chat_url(),
            llm: LlmSettings::default(),
            tools: ToolSettings::default(),
            request_timeout_seconds: Self::default_request_timeout(),
            connect_timeout_seconds: Self::default_connect_timeout(),
            event_buffer: Self::default_event_buffer(),
        }
    }
}
