use memchr::memmem;
use serde::{Deserialize, Serialize};

/// Marks the true end of the assistant message
pub const STREAM_COMPLETE_MARKER: &str = "\n\n__STREAM_COMPLETE__";

/// Older completion marker, still accepted
pub const LEGACY_DONE_MARKER: &str = "\n\n[DONE]";

/// In-band completion marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentinel {
    Primary,
    Legacy,
}

impl Sentinel {
    pub const ALL: [Sentinel; 2] = [Sentinel::Primary, Sentinel::Legacy];

    /// Literal text of the marker
    pub const fn marker(self) -> &'static str {
        match self {
            Sentinel::Primary => STREAM_COMPLETE_MARKER,
            Sentinel::Legacy => LEGACY_DONE_MARKER,
        }
    }

    /// Length in bytes of the longest marker
    pub const fn max_len() -> usize {
        if STREAM_COMPLETE_MARKER.len() > LEGACY_DONE_MARKER.len() {
            STREAM_COMPLETE_MARKER.len()
        } else {
            LEGACY_DONE_MARKER.len()
        }
    }
}

/// A sentinel located in a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelMatch {
    pub sentinel: Sentinel,
    /// Byte offset of the first marker byte
    pub start: usize,
}

impl SentinelMatch {
    /// Byte offset one past the last marker byte
    pub fn end(&self) -> usize {
        self.start + self.sentinel.marker().len()
    }
}

/// Find the earliest sentinel that starts at or after byte offset `from`.
///
/// Works on bytes so `from` does not need to sit on a char boundary.
pub fn find_sentinel(haystack: &str, from: usize) -> Option<SentinelMatch> {
    let bytes = haystack.as_bytes();
    if from >= bytes.len() {
        return None;
    }
    let window = &bytes[from..];

    Sentinel::ALL
        .iter()
        .filter_map(|&sentinel| {
            memmem::find(window, sentinel.marker().as_bytes()).map(|offset| SentinelMatch {
                sentinel,
                start: from + offset,
            })
        })
        .min_by_key(|found| found.start)
}
