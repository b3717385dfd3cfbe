use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// Chat request as posted by a client
///
/// Every field is optional on the wire so that a missing `user_message`
/// surfaces as a validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChatRequest {
    /// Create a request carrying only the user message
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: Some(user_message.into()),
            developer_message: None,
            model: None,
        }
    }

    /// Set the developer (system) message
    pub fn with_developer_message(mut self, message: impl Into<String>) -> Self {
        self.developer_message = Some(message.into());
        self
    }

    /// Set the target model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Whether the request carries a non-empty user message
    pub fn has_user_message(&self) -> bool {
        self.user_message
            .as_deref()
            .is_some_and(|message| !message.is_empty())
    }

    /// Validate and convert into the request sent upstream
    pub fn into_upstream(self) -> Result<UpstreamRequest, RelayError> {
        match self.user_message {
            Some(user_message) if !user_message.is_empty() => Ok(UpstreamRequest {
                user_message,
                developer_message: self.developer_message,
                model: self.model,
            }),
            _ => Err(RelayError::Validation),
        }
    }
}

/// Request forwarded to the upstream completions endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamRequest {
    pub user_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub developer_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}
