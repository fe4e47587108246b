//! HTTP client for the streaming chat endpoint.
//!
//! The endpoint takes the projected transcript and answers with a
//! `text/event-stream` body, which is handed back as a raw byte stream for
//! [`crate::stream::decode_stream`] to frame.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ControlError, Result};
use crate::feedback::OutboundMessage;
use crate::types::{ChatConfig, LlmSettings};

/// Raw body chunks of a streaming response.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Request body posted to the chat endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Transcript as sent to the model.
    pub messages: Vec<OutboundMessage>,
    /// `OpenAPI` document describing the tool target.
    pub openapi_schema: Option<Value>,
    /// Present and `true` when the model may call tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_tools: Option<bool>,
}

impl ChatRequest {
    /// Build a request over `messages`.
    #[must_use]
    pub fn new(
        messages: Vec<OutboundMessage>,
        openapi_schema: Option<Value>,
        enable_tools: bool,
    ) -> Self {
        Self {
            messages,
            openapi_schema,
            enable_tools: enable_tools.then_some(true),
        }
    }
}

/// Trait for the model endpoint.
///
/// This trait abstracts the transport, allowing for scripted
/// implementations in tests.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Open a streaming chat completion.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Http` for a non-success status and
    /// `ControlError::Transport` if the request could not be sent.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream>;
}

/// HTTP client for the chat endpoint.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    client: reqwest::Client,
    chat_url: String,
    llm: LlmSettings,
}

impl HttpModelClient {
    /// Create a client from the session configuration.
    ///
    /// Only a connect timeout is applied; a response stream may stay open
    /// for as long as the model keeps producing.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self::with_client(
            client,
            config.chat_url.clone(),
            config.llm.clone(),
        ))
    }

    /// Create a client with a custom reqwest client.
    #[must_use]
    pub fn with_client(
        client: reqwest::Client,
        chat_url: impl Into<String>,
        llm: LlmSettings,
    ) -> Self {
        Self {
            client,
            chat_url: chat_url.into(),
            llm,
        }
    }

    /// Get the chat endpoint URL.
    #[must_use]
    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let mut builder = self.client.post(&self.chat_url).json(request);
        for (name, value) in self.llm.headers() {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                url = %self.chat_url,
                status = %status,
                "Chat endpoint rejected request"
            );
            return Err(ControlError::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        tracing::debug!(
            url = %self.chat_url,
            messages = request.messages.len(),
            "Opened chat stream"
        );

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ControlError::from))
            .boxed())
    }
}
