//! Per-(provider, channel) conversation history.

use switchboard_config::HistoryConfig;
use switchboard_core::message::ChatTurn;
use tracing::debug;

/// Ordered turns with a hard cap.
///
/// When a push takes the history past `cap`, only the newest `keep` turns
/// survive, so the cap holds after every completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHistory {
    turns: Vec<ChatTurn>,
    cap: usize,
    keep: usize,
}

impl ConversationHistory {
    pub fn new(cap: usize, keep: usize) -> Self {
        let cap = cap.max(1);
        Self {
            turns: Vec::new(),
            cap,
            keep: keep.clamp(1, cap),
        }
    }

    pub fn from_config(config: &HistoryConfig) -> Self {
        Self::new(config.cap, config.keep)
    }

    /// Seed with previously stored turns, oldest first.
    pub fn with_turns(mut self, turns: Vec<ChatTurn>) -> Self {
        self.turns = turns;
        self.enforce_cap();
        self
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
        self.enforce_cap();
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    fn enforce_cap(&mut self) {
        if self.turns.len() > self.cap {
            let drop = self.turns.len() - self.keep;
            self.turns.drain(..drop);
            debug!(kept = self.keep, dropped = drop, "History truncated");
        }
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::from_config(&HistoryConfig::default())
    }
}
