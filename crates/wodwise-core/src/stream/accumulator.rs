use super::decoder::Utf8Decoder;
use super::sentinel::{find_sentinel, Sentinel};
use super::state::{Completion, StreamPhase, StreamState};

/// Result of feeding one chunk to a [`StreamAccumulator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The chunk added no text
    Pending,
    /// Text grew; snapshot with `completed = false`
    Grew(StreamState),
    /// Terminal snapshot; no further chunks should be read
    Done(StreamState),
}

impl Progress {
    pub fn snapshot(&self) -> Option<&StreamState> {
        match self {
            Progress::Pending => None,
            Progress::Grew(state) | Progress::Done(state) => Some(state),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Progress::Done(_))
    }
}

/// Accumulates decoded chunks and watches for a completion sentinel.
///
/// The sentinel scan runs on the cumulative buffer, restarting just far
/// enough back to catch a marker split across chunks.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    state: StreamState,
    decoder: Utf8Decoder,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &StreamState {
        &self.state
    }

    pub fn phase(&self) -> StreamPhase {
        self.state.phase
    }

    /// Feed the next chunk, in arrival order
    pub fn push(&mut self, chunk: &[u8]) -> Progress {
        if self.state.is_done() {
            return Progress::Done(self.state.clone());
        }
        if chunk.is_empty() {
            return Progress::Pending;
        }
        self.state.phase = StreamPhase::Streaming;

        let before = self.state.accumulated_text.len();
        self.decoder.decode(chunk, &mut self.state.accumulated_text);
        if self.state.accumulated_text.len() == before {
            return Progress::Pending;
        }

        let from = before.saturating_sub(Sentinel::max_len() - 1);
        if let Some(found) = find_sentinel(&self.state.accumulated_text, from) {
            self.state
                .accumulated_text
                .replace_range(found.start..found.end(), "");
            self.complete(Completion::Sentinel(found.sentinel));
            return Progress::Done(self.state.clone());
        }

        Progress::Grew(self.state.clone())
    }

    /// Transport closed. Whatever has accumulated is the final text.
    pub fn finish(&mut self) -> StreamState {
        if !self.state.is_done() {
            self.decoder.flush(&mut self.state.accumulated_text);
            self.complete(Completion::EndOfStream);
        }
        self.state.clone()
    }

    /// The call failed; `message` replaces the reply
    pub fn fail(&mut self, message: impl Into<String>) -> StreamState {
        if !self.state.is_done() {
            self.decoder.flush(&mut self.state.accumulated_text);
            self.state.failure = Some(message.into());
            self.complete(Completion::Failed);
        }
        self.state.clone()
    }

    pub fn into_state(self) -> StreamState {
        self.state
    }

    fn complete(&mut self, completion: Completion) {
        self.state.completed = true;
        self.state.phase = StreamPhase::Done;
        self.state.completion = Some(completion);
    }
}
