//! WODWise relay service
//!
//! Accepts `POST /api/chat`, forwards the request to the completions backend
//! and streams the response body back unmodified.

pub mod error;
pub mod relay;
pub mod server;

pub use error::{ApiError, ServerError};
pub use relay::{RelayService, RelayStream};
pub use server::{create_router, run_server, serve, AppState};
