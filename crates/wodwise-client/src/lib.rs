//! Stream consumer for the WODWise relay
//!
//! Posts a chat turn to the relay and reads the plain-text response
//! incrementally, finishing on the completion sentinel or when the relay
//! closes the stream.

pub mod consumer;
pub mod error;

pub use consumer::{drive, StreamConsumer};
pub use error::{format_error_message, ConsumerError, Result};
pub use wodwise_core::{ChatRequest, Completion, StreamPhase, StreamState};
