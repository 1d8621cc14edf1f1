//! Context window selection.
//!
//! Token costs come from the fixed character ratio in
//! [`switchboard_core::tokens`]; this module decides which history suffix
//! fits a provider's ceiling.

mod budget;

pub use budget::{MIN_CONTEXT_TURNS, build_context, window_cost};
pub use switchboard_core::tokens::{TURN_OVERHEAD_TOKENS, estimate_tokens, estimate_turn_tokens};
