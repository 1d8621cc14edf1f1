//! Rough token estimation.
//!
//! Backends tokenize differently and none of their tokenizers ship here, so
//! every budget decision uses one fixed ratio of characters per token.

const CHARS_PER_TOKEN: f64 = 3.5;

/// Framing overhead charged per chat turn on top of its content.
pub const TURN_OVERHEAD_TOKENS: usize = 4;

/// Estimated token count of `text`; never less than 1.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count() as f64;
    ((chars / CHARS_PER_TOKEN) as usize).max(1)
}

/// Estimated cost of one turn including framing.
pub fn estimate_turn_tokens(content: &str) -> usize {
    estimate_tokens(content) + TURN_OVERHEAD_TOKENS
}
