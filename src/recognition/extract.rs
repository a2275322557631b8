//! Command extraction from transcription events.
//!
//! Each event's transcript is split into whitespace-delimited tokens. An
//! empty token list, or one identical to the most recently accepted list,
//! is discarded without touching any state; anything else becomes the next
//! command batch. Interim and final events are treated alike — the repeat
//! check is what suppresses the backend re-sending a settled utterance.

use crate::recognition::backend::TranscriptionEvent;

/// Stateful extractor remembering the last accepted token sequence.
#[derive(Debug, Default)]
pub struct CommandExtractor {
    last_accepted: Vec<String>,
}

impl CommandExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consider one event; returns the token batch if it was accepted.
    pub fn accept(&mut self, event: &TranscriptionEvent) -> Option<Vec<String>> {
        let tokens: Vec<String> = event
            .transcript
            .split_whitespace()
            .map(str::to_string)
            .collect();

        if tokens.is_empty() || tokens == self.last_accepted {
            return None;
        }

        self.last_accepted = tokens.clone();
        Some(tokens)
    }

    /// The most recently accepted token sequence (empty before the first).
    pub fn last_accepted(&self) -> &[String] {
        &self.last_accepted
    }
}
