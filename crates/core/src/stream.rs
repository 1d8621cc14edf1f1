//! Normalized streaming events.
//!
//! Every backend wire format is reduced to a sequence of [`StreamEvent`]s.
//! A well-formed sequence ends with exactly one [`StreamEvent::End`].

use serde::{Deserialize, Serialize};

/// Token usage reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenCounts {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Fold a later observation into this one.
    ///
    /// Backends report counts in separate frames (input at start, output at
    /// the end), so a zero never overwrites a value seen earlier.
    pub fn merge(&mut self, other: TokenCounts) {
        if other.input_tokens > 0 {
            self.input_tokens = other.input_tokens;
        }
        if other.output_tokens > 0 {
            self.output_tokens = other.output_tokens;
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// One unit of an in-flight backend response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A text fragment, in wire order.
    Chunk(String),
    /// Token counts observed so far.
    Meta(TokenCounts),
    /// A failure reported by the backend or the transport.
    Error(String),
    /// Terminal marker.
    End,
}

impl StreamEvent {
    pub fn is_end(&self) -> bool {
        matches!(self, StreamEvent::End)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_keeps_earlier_input_count() {
        let mut counts = TokenCounts::new(120, 0);
        counts.merge(TokenCounts::new(0, 45));
        assert_eq!(counts, TokenCounts::new(120, 45));
        assert_eq!(counts.total(), 165);
    }

    #[test]
    fn merge_overwrites_with_newer_nonzero_values() {
        let mut counts = TokenCounts::new(10, 5);
        counts.merge(TokenCounts::new(12, 9));
        assert_eq!(counts, TokenCounts::new(12, 9));
    }
}
