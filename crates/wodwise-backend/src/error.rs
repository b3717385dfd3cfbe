use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use wodwise_core::ErrorBody;

/// Errors raised by the completions backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Missing required parameters")]
    Validation,

    #[error("Invalid request body")]
    InvalidBody,

    #[error("No API key provided and no default API key found")]
    MissingApiKey,

    /// The provider rejected the request before streaming started
    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("{0}")]
    Network(String),

    /// The provider failed after streaming started
    #[error("{0}")]
    Stream(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid listen address: {0}")]
    Address(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation | Self::MissingApiKey => StatusCode::BAD_REQUEST,
            Self::InvalidBody => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Provider { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, BackendError>;
