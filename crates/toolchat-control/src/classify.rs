//! Error classification.
//!
//! Failures from the chat endpoint are mapped to a user-facing category by
//! case-insensitive substring matching over the error message and any detail
//! extracted from the response body. Categories are tested in a fixed order
//! and the first match wins.

use serde::Serialize;
use serde_json::Value;

/// Raw response text shorter than this is used verbatim as detail.
const MAX_RAW_DETAIL_LEN: usize = 500;

/// Category of a failed model request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The provider could not be reached.
    Connection,
    /// Credentials were rejected.
    Authentication,
    /// Unknown model or endpoint.
    NotFound,
    /// The provider throttled the request.
    RateLimited,
    /// The request took too long.
    Timeout,
    /// The provider failed internally.
    ServerError,
    /// A cross-origin policy blocked the request.
    Cors,
    /// Anything else.
    Generic,
}

impl ErrorKind {
    /// Every category in matching order.
    pub const ALL: [Self; 8] = [
        Self::Connection,
        Self::Authentication,
        Self::NotFound,
        Self::RateLimited,
        Self::Timeout,
        Self::ServerError,
        Self::Cors,
        Self::Generic,
    ];

    const fn needles(self) -> &'static [&'static str] {
        match self {
            Self::Connection => &[
                "connection refused",
                "connect timeout",
                "network",
                "econnrefused",
                "enotfound",
                "fetch failed",
            ],
            Self::Authentication => &[
                "401",
                "403",
                "unauthorized",
                "invalid api key",
                "authentication",
                "api key",
            ],
            Self::NotFound => &["404", "not found", "model"],
            Self::RateLimited => &["429", "rate limit", "too many requests"],
            Self::Timeout => &["timeout", "timed out"],
            Self::ServerError => &["500", "502", "503", "504", "server error"],
            Self::Cors => &["cors", "access-control"],
            Self::Generic => &[],
        }
    }

    /// Short title shown to the user.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Connection => "Connection Failed",
            Self::Authentication => "Authentication Failed",
            Self::NotFound => "Resource Not Found",
            Self::RateLimited => "Rate Limited",
            Self::Timeout => "Request Timeout",
            Self::ServerError => "Server Error",
            Self::Cors => "CORS Error",
            Self::Generic => "Request Failed",
        }
    }

    /// Returns true if the fix is most likely in the model settings.
    #[must_use]
    pub const fn needs_settings(self) -> bool {
        matches!(
            self,
            Self::Connection | Self::Authentication | Self::NotFound | Self::Generic
        )
    }

    const fn canned_message(self) -> Option<&'static str> {
        match self {
            Self::Connection => Some(
                "Could not connect to your LLM provider. Please verify your Base URL in Settings.",
            ),
            Self::Authentication => Some(
                "Your API key appears to be invalid or missing. Please check your API Key in Settings.",
            ),
            Self::NotFound => Some(
                "The requested resource was not found. This might mean your Model ID is incorrect or the endpoint doesn't exist.",
            ),
            Self::RateLimited => {
                Some("You've sent too many requests. Please wait a moment and try again.")
            }
            Self::Timeout => Some(
                "The request took too long. The LLM provider may be busy or experiencing issues.",
            ),
            Self::ServerError => Some(
                "The LLM provider's server encountered an error. This is usually a temporary issue.",
            ),
            Self::Cors => Some(
                "Cross-origin request blocked. This is usually a configuration issue with the LLM provider.",
            ),
            Self::Generic => None,
        }
    }

    fn matches(self, haystack: &str) -> bool {
        self.needles().iter().any(|n| haystack.contains(n))
    }
}

/// A classified, presentable error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    /// Matched category.
    pub kind: ErrorKind,
    /// Short title.
    pub title: String,
    /// Explanation for the user.
    pub message: String,
    /// Detail extracted from the response, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ClassifiedError {
    /// Returns true if the user should revisit the model settings.
    #[must_use]
    pub const fn needs_settings(&self) -> bool {
        self.kind.needs_settings()
    }

    /// Suggested follow-up action label.
    #[must_use]
    pub const fn action(&self) -> Option<&'static str> {
        if self.needs_settings() {
            Some("Check Settings")
        } else {
            None
        }
    }

    /// Text of the error message appended to the transcript.
    #[must_use]
    pub fn transcript_text(&self) -> String {
        format!("{}: {}", self.title, self.message)
    }
}

/// Extract a detail string from a failed response body.
///
/// A JSON body contributes its `details` or `error` field; any other body
/// shorter than 500 characters is used as-is.
#[must_use]
pub fn extract_details(response_text: &str) -> Option<String> {
    let text = response_text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(Value::Object(body)) = serde_json::from_str::<Value>(text) {
        let field = body
            .get("details")
            .filter(|v| !v.is_null())
            .or_else(|| body.get("error").filter(|v| !v.is_null()));
        return match field {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::String(_)) | None => None,
            Some(other) => Some(other.to_string()),
        };
    }

    (text.chars().count() < MAX_RAW_DETAIL_LEN).then(|| text.to_string())
}

/// Classify a failure from its message and optional response body.
#[must_use]
pub fn classify(message: &str, response_text: Option<&str>) -> ClassifiedError {
    let details = response_text.and_then(extract_details);
    let haystack = format!("{} {}", message, details.as_deref().unwrap_or_default()).to_lowercase();

    let kind = ErrorKind::ALL
        .into_iter()
        .find(|k| k.matches(&haystack))
        .unwrap_or(ErrorKind::Generic);

    let text = kind.canned_message().map_or_else(
        || {
            details
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| message.to_string())
        },
        str::to_string,
    );

    tracing::debug!(kind = ?kind, error = %message, "Classified model error");

    ClassifiedError {
        kind,
        title: kind.title().to_string(),
        message: text,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_by_message() {
        let cases = [
            ("TypeError: fetch failed", ErrorKind::Connection),
            ("HTTP 401: Unauthorized", ErrorKind::Authentication),
            ("HTTP 404: Not Found", ErrorKind::NotFound),
            ("HTTP 429: Too Many Requests", ErrorKind::RateLimited),
            ("operation timed out", ErrorKind::Timeout),
            ("HTTP 502: Bad Gateway", ErrorKind::ServerError),
            ("blocked by CORS policy", ErrorKind::Cors),
            ("something odd", ErrorKind::Generic),
        ];
        for (message, kind) in cases {
            assert_eq!(classify(message, None).kind, kind, "{message}");
        }
    }

    #[test]
    fn first_match_wins() {
        // "connect timeout" is a connection failure even though it mentions a timeout.
        assert_eq!(classify("connect timeout", None).kind, ErrorKind::Connection);
        // "model" matches not-found before the server error code.
        assert_eq!(
            classify("HTTP 500: model overloaded", None).kind,
            ErrorKind::NotFound
        );
    }

    #[test]
    fn details_from_json_body() {
        let err = classify(
            "HTTP 400: Bad Request",
            Some(r#"{"error": "Invalid API key provided"}"#),
        );
        assert_eq!(err.kind, ErrorKind::Authentication);
        assert_eq!(err.details.as_deref(), Some("Invalid API key provided"));
        assert_eq!(err.action(), Some("Check Settings"));
        assert_eq!(
            err.transcript_text(),
            "Authentication Failed: Your API key appears to be invalid or missing. Please check your API Key in Settings."
        );
    }

    #[test]
    fn details_prefers_details_field() {
        assert_eq!(
            extract_details(r#"{"error": "bad", "details": "worse"}"#).as_deref(),
            Some("worse")
        );
        assert_eq!(extract_details(r#"{"other": 1}"#), None);
        assert_eq!(extract_details("plain text").as_deref(), Some("plain text"));
        assert_eq!(extract_details(&"x".repeat(600)), None);
        assert_eq!(extract_details("  "), None);
    }

    #[test]
    fn generic_uses_details_then_message() {
        let with_details = classify("HTTP 400: Bad Request", Some("quota exhausted"));
        assert_eq!(with_details.kind, ErrorKind::Generic);
        assert_eq!(with_details.message, "quota exhausted");

        let without = classify("HTTP 400: Bad Request", None);
        assert_eq!(without.message, "HTTP 400: Bad Request");
        assert_eq!(without.title, "Request Failed");
    }

    #[test]
    fn transient_categories_do_not_suggest_settings() {
        for kind in [
            ErrorKind::RateLimited,
            ErrorKind::Timeout,
            ErrorKind::ServerError,
            ErrorKind::Cors,
        ] {
            assert!(!kind.needs_settings());
        }
        assert!(classify("HTTP 503: Service Unavailable", None).action().is_none());
    }
}
