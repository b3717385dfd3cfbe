use serde::{Deserialize, Serialize};

use super::sentinel::Sentinel;

/// Lifecycle of one consumed stream. No transition leaves `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    /// Request issued, no bytes yet
    Pending,
    /// At least one chunk received, no sentinel yet
    Streaming,
    /// Terminal
    Done,
}

/// Why a stream reached `Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// An in-band sentinel was seen and stripped
    Sentinel(Sentinel),
    /// The transport closed without a sentinel
    EndOfStream,
    /// The relay call failed; `failure` carries the user-facing message
    Failed,
}

/// Snapshot of a consumed stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    pub accumulated_text: String,
    pub completed: bool,
    pub phase: StreamPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<Completion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl StreamState {
    pub fn new() -> Self {
        Self {
            accumulated_text: String::new(),
            completed: false,
            phase: StreamPhase::Pending,
            completion: None,
            failure: None,
        }
    }

    /// Terminal state for a call that failed before any text arrived
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            accumulated_text: String::new(),
            completed: true,
            phase: StreamPhase::Done,
            completion: Some(Completion::Failed),
            failure: Some(message.into()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == StreamPhase::Done
    }

    /// Text to show in place of the assistant reply
    pub fn message(&self) -> &str {
        self.failure.as_deref().unwrap_or(&self.accumulated_text)
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_state_message() {
        let state = StreamState::failed("Error: boom");
        assert!(state.completed);
        assert!(state.is_done());
        assert!(state.accumulated_text.is_empty());
        assert_eq!(state.message(), "Error: boom");
    }

    #[test]
    fn test_state_serialization() {
        let mut state = StreamState::new();
        state.accumulated_text = "Hi".to_string();
        state.completed = true;
        state.phase = StreamPhase::Done;
        state.completion = Some(Completion::Sentinel(Sentinel::Primary));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "accumulated_text": "Hi",
                "completed": true,
                "phase": "done",
                "completion": {"sentinel": "primary"}
            })
        );
    }
}
