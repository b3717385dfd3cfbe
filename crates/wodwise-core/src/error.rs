use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Fallback when an error body is JSON but names no message
pub const UNKNOWN_API_ERROR: &str = "Unknown API error";

/// Error returned by the relay before any byte of the stream is forwarded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// `user_message` missing or empty; never forwarded upstream
    #[error("Missing required parameters")]
    Validation,

    /// Upstream answered with a non-success status
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// Upstream could not be reached at all
    #[error("{message}")]
    Unavailable { message: String },

    /// Upstream reported success without a body to stream
    #[error("No response from API")]
    EmptyBody,

    /// Inbound body could not be parsed as a chat request
    #[error("Internal server error")]
    InvalidBody,
}

impl RelayError {
    /// Create an upstream error with an explicit status
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Create an error for an upstream that could not be reached
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Build the error for a non-success upstream response.
    ///
    /// A JSON body contributes its `error`/`message` text; anything else
    /// falls back to the status phrase.
    pub fn from_upstream_response(status: u16, reason: Option<&str>, body: &[u8]) -> Self {
        let message = match serde_json::from_slice::<Value>(body) {
            Ok(value) => {
                extract_error_message(&value).unwrap_or_else(|| UNKNOWN_API_ERROR.to_string())
            }
            Err(_) => status_phrase_message(status, reason),
        };

        Self::Upstream { status, message }
    }

    /// HTTP status the client sees
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Upstream { status, .. } => *status,
            Self::Unavailable { .. } | Self::EmptyBody | Self::InvalidBody => 500,
        }
    }

    /// Message placed in the `error` field
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Structured body sent to the client
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.message(),
        }
    }
}

/// `{ "error": "..." }` body shared by the relay, the backend and the consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `API Error: <phrase>` message used when an error body is not JSON
pub fn status_phrase_message(status: u16, reason: Option<&str>) -> String {
    match reason {
        Some(reason) if !reason.is_empty() => format!("API Error: {}", reason),
        _ => format!("API Error: {}", status),
    }
}

/// Pull a human readable message out of a JSON error payload.
///
/// Looks at `error` (string or `{ "message": ... }`), then `message`, then
/// `detail`. Empty strings are skipped.
pub fn extract_error_message(value: &Value) -> Option<String> {
    let from_error = value.get("error").and_then(|error| match error {
        Value::String(text) => non_empty(text),
        Value::Object(map) => map.get("message").and_then(Value::as_str).and_then(non_empty),
        _ => None,
    });

    from_error
        .or_else(|| value.get("message").and_then(Value::as_str).and_then(non_empty))
        .or_else(|| value.get("detail").and_then(Value::as_str).and_then(non_empty))
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fixed_errors() {
        assert_eq!(RelayError::Validation.status_code(), 400);
        assert_eq!(RelayError::Validation.message(), "Missing required parameters");
        assert_eq!(RelayError::EmptyBody.status_code(), 500);
        assert_eq!(RelayError::EmptyBody.message(), "No response from API");
        assert_eq!(RelayError::InvalidBody.message(), "Internal server error");
    }

    #[test]
    fn test_json_error_field() {
        let err = RelayError::from_upstream_response(
            503,
            Some("Service Unavailable"),
            br#"{"error":"rate limited"}"#,
        );
        assert_eq!(err.status_code(), 503);
        assert_eq!(err.message(), "rate limited");
    }

    #[test]
    fn test_non_json_falls_back_to_status_phrase() {
        let err = RelayError::from_upstream_response(502, Some("Bad Gateway"), b"Bad Gateway");
        assert_eq!(err, RelayError::upstream(502, "API Error: Bad Gateway"));

        let err = RelayError::from_upstream_response(599, None, b"");
        assert_eq!(err.message(), "API Error: 599");
    }

    #[test]
    fn test_json_without_message_is_unknown() {
        let err = RelayError::from_upstream_response(500, Some("Internal Server Error"), b"{}");
        assert_eq!(err.message(), UNKNOWN_API_ERROR);
    }

    #[test]
    fn test_extract_error_message_precedence() {
        assert_eq!(
            extract_error_message(&json!({"error": "a", "message": "b"})),
            Some("a".to_string())
        );
        assert_eq!(
            extract_error_message(&json!({"error": {"message": "nested"}})),
            Some("nested".to_string())
        );
        assert_eq!(
            extract_error_message(&json!({"error": "", "message": "b"})),
            Some("b".to_string())
        );
        assert_eq!(
            extract_error_message(&json!({"detail": "No API key"})),
            Some("No API key".to_string())
        );
        assert_eq!(extract_error_message(&json!("plain")), None);
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(RelayError::Validation.to_body()).unwrap();
        assert_eq!(body, json!({"error": "Missing required parameters"}));
    }
}
