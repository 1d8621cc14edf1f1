//! Chat orchestration for Switchboard.
//!
//! A user turn flows through four pieces:
//!
//! 1. [`ChatSession`] holds per-connection state and lazily loaded histories
//! 2. [`context::build_context`] trims history to a provider's token ceiling
//! 3. [`ChatOrchestrator`] walks the failover chain and streams the reply
//! 4. [`ChatEvent`] carries the result back to the client

pub mod context;
pub mod event;
pub mod history;
pub mod orchestrator;
pub mod session;

pub use event::{ChatCommand, ChatEvent};
pub use history::ConversationHistory;
pub use orchestrator::{ChatOrchestrator, ChatOutcome, ReplySink};
pub use session::ChatSession;
