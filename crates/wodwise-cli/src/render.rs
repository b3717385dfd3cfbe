//! Incremental rendering of one chat turn

use std::io::{self, Write};

use colored::Colorize;
use wodwise_core::{Sentinel, StreamState};

pub const PENDING_INDICATOR: &str = "…";
const ERASE_INDICATOR: &str = "\u{8} \u{8}";

/// Prints the reply as snapshots grow.
///
/// The pending indicator stays at the end of the output until the terminal
/// snapshot arrives. A trailing fragment that could still turn into a
/// completion marker is held back until the next snapshot.
pub struct TurnPrinter<W: Write> {
    out: W,
    printed: usize,
    indicator: bool,
}

impl<W: Write> TurnPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: 0,
            indicator: false,
        }
    }

    /// Show the pending indicator before the first chunk
    pub fn start(&mut self) -> io::Result<()> {
        self.out.write_all(PENDING_INDICATOR.as_bytes())?;
        self.indicator = true;
        self.out.flush()
    }

    pub fn update(&mut self, state: &StreamState) -> io::Result<()> {
        let text = &state.accumulated_text;
        let end = if state.completed {
            text.len()
        } else {
            text.len() - held_back(text)
        };
        let delta = text.get(self.printed..end).unwrap_or_default();

        if delta.is_empty() && !state.completed {
            return Ok(());
        }

        self.clear_indicator()?;
        self.out.write_all(delta.as_bytes())?;
        self.printed = self.printed.max(end);

        if state.completed {
            if let Some(failure) = &state.failure {
                if self.printed > 0 {
                    writeln!(self.out)?;
                }
                write!(self.out, "{}", failure.red())?;
            }
            writeln!(self.out)?;
        } else {
            self.out.write_all(PENDING_INDICATOR.as_bytes())?;
            self.indicator = true;
        }
        self.out.flush()
    }

    pub fn is_pending(&self) -> bool {
        self.indicator
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn clear_indicator(&mut self) -> io::Result<()> {
        if self.indicator {
            self.out.write_all(ERASE_INDICATOR.as_bytes())?;
            self.indicator = false;
        }
        Ok(())
    }
}

/// Length of the longest suffix of `text` that begins a completion marker
fn held_back(text: &str) -> usize {
    let longest = (Sentinel::max_len() - 1).min(text.len());
    (1..=longest)
        .rev()
        .find(|&len| {
            let start = text.len() - len;
            text.is_char_boundary(start)
                && Sentinel::ALL
                    .iter()
                    .any(|sentinel| sentinel.marker().starts_with(&text[start..]))
        })
        .unwrap_or(0)
}
