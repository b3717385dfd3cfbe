use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use wodwise_core::RelayError;

/// HTTP face of a [`RelayError`]: mirrored status plus `{ "error": ... }`
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_body())).into_response()
    }
}

/// Errors raised while setting up or running the relay server
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid upstream header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid listen address: {0}")]
    Address(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
