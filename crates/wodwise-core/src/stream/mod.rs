//! Consumer-side stream handling
//!
//! The relay forwards bytes verbatim; completion is signalled either by the
//! transport closing or by an in-band sentinel the consumer strips.

pub mod accumulator;
pub mod decoder;
pub mod sentinel;
pub mod state;

pub use accumulator::{Progress, StreamAccumulator};
pub use decoder::Utf8Decoder;
pub use sentinel::{
    find_sentinel, Sentinel, SentinelMatch, LEGACY_DONE_MARKER, STREAM_COMPLETE_MARKER,
};
pub use state::{Completion, StreamPhase, StreamState};
