//! HTTP executor for confirmed tool calls.

use async_trait::async_trait;

use crate::error::Result;
use crate::feedback::ExecutionResult;
use crate::gate::ToolRequest;
use crate::types::ChatConfig;

/// Trait for tool execution.
///
/// Execution never fails as such: a request that gets no response is
/// reported as status `0` so it flows through the retry loop like any other
/// failed call.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Send the request and capture the response.
    async fn execute(&self, request: &ToolRequest) -> ExecutionResult;
}

/// reqwest-backed tool executor.
#[derive(Debug, Clone)]
pub struct HttpToolExecutor {
    client: reqwest::Client,
}

impl HttpToolExecutor {
    /// Create an executor with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self::with_client(client))
    }

    /// Create an executor with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    async fn execute(&self, request: &ToolRequest) -> ExecutionResult {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    method = %request.method,
                    url = %request.url,
                    error = %e,
                    "Tool request failed"
                );
                return ExecutionResult::network_error(e.to_string());
            }
        };

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "Failed to read tool response body");
                return ExecutionResult::network_error(e.to_string());
            }
        };

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            "Executed tool request"
        );

        ExecutionResult::new(status.as_u16(), status_text, body)
    }
}
