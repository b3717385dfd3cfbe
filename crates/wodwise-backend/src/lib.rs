//! WODWise completions backend
//!
//! Accepts `POST /api/chat`, calls an OpenAI-compatible chat completions API
//! with streaming enabled and writes the text deltas back as a plain text
//! stream terminated by the completion marker.

pub mod error;
pub mod provider;
pub mod server;

pub use error::{BackendError, Result};
pub use provider::{parse_stream_chunk, CompletionsClient, DeltaStream, StreamChunk};
pub use server::{create_router, run_server, BackendState, CompletionRequest};
