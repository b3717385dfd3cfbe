//! Shared types for the WODWise chat relay.
//!
//! - [`chat`]: the inbound chat request and the request forwarded upstream
//! - [`error`]: the relay error contract (`{ "error": ... }` bodies)
//! - [`stream`]: sentinel markers and the consumer-side stream state machine

pub mod chat;
pub mod error;
pub mod stream;

pub use chat::{ChatRequest, UpstreamRequest};
pub use error::{extract_error_message, status_phrase_message, ErrorBody, RelayError, Result};
pub use stream::{
    find_sentinel, Completion, Progress, Sentinel, SentinelMatch, StreamAccumulator, StreamPhase,
    StreamState, Utf8Decoder, LEGACY_DONE_MARKER, STREAM_COMPLETE_MARKER,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
