use serde_json::Value;
use wodwise_core::{extract_error_message, status_phrase_message};

/// Failure of a relay call as seen by the consumer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsumerError {
    /// The request could not be sent or the body could not be read
    #[error("{0}")]
    Transport(String),

    /// The relay answered with a non-success status
    #[error("{message}")]
    Status { status: u16, message: String },
}

impl ConsumerError {
    /// Build from a relay error response body
    pub fn from_error_body(status: u16, reason: Option<&str>, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|value| extract_error_message(&value))
            .unwrap_or_else(|| status_phrase_message(status, reason));
        Self::Status { status, message }
    }

    /// Read the body of a failed response
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.bytes().await.unwrap_or_default();
        Self::from_error_body(status.as_u16(), status.canonical_reason(), &body)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

impl From<reqwest::Error> for ConsumerError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        let mut message = err.to_string();
        if let Some(cause) = std::error::Error::source(&err) {
            message = format!("{}: {}", message, cause);
        }
        Self::Transport(message)
    }
}

/// Text shown in place of the assistant reply when a turn fails
pub fn format_error_message(message: &str) -> String {
    format!("Error: {}", message)
}

pub type Result<T> = std::result::Result<T, ConsumerError>;
