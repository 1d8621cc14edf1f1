use switchboard_core::message::ChatTurn;
use switchboard_core::tokens::{estimate_tokens, estimate_turn_tokens};
use tracing::{debug, warn};

/// Turns kept even when they do not fit the budget.
pub const MIN_CONTEXT_TURNS: usize = 4;

/// Select the newest turns of `history` that fit `budget` tokens once the
/// system prompt is paid for.
///
/// Walks newest to oldest and stops at the first turn that does not fit,
/// but never before [`MIN_CONTEXT_TURNS`] turns are taken (or the history
/// runs out). The result is always a suffix of `history`.
pub fn build_context<'a>(history: &'a [ChatTurn], budget: usize, system_prompt: &str) -> &'a [ChatTurn] {
    let budget = budget as i64;
    let mut remaining = budget - estimate_tokens(system_prompt) as i64;
    let mut start = history.len();

    for (index, turn) in history.iter().enumerate().rev() {
        let cost = estimate_turn_tokens(&turn.content) as i64;
        let taken = history.len() - start;
        if remaining - cost < 0 && taken >= MIN_CONTEXT_TURNS {
            break;
        }
        remaining -= cost;
        start = index;
    }

    let selected = &history[start..];
    if remaining < 0 {
        warn!(
            turns = selected.len(),
            budget,
            overshoot = -remaining,
            "Context exceeds budget to keep the minimum turns"
        );
    } else if selected.len() < history.len() {
        debug!(
            turns = selected.len(),
            of = history.len(),
            used = budget - remaining,
            budget,
            "Context trimmed"
        );
    }
    selected
}

/// Estimated cost of a window of turns.
pub fn window_cost(turns: &[ChatTurn]) -> usize {
    turns.iter().map(|t| estimate_turn_tokens(&t.content)).sum()
}
