//! # Switchboard Core
//!
//! Domain types, traits, and error definitions for the Switchboard chat
//! gateway. This crate has no framework dependencies; it defines the model
//! that all other crates implement against.
//!
//! Storage and operator notification are traits here. Implementations live
//! in their own crates, so the orchestrator can be driven by in-memory stubs
//! in tests.

pub mod error;
pub mod knowledge;
pub mod message;
pub mod notify;
pub mod store;
pub mod stream;
pub mod tokens;

// Re-export key types at crate root for ergonomics
pub use error::{NotifyError, ProviderError, StoreError};
pub use knowledge::{DigestRecord, EntityKind, ExtractedEntity, KnowledgeEntity, KnowledgeRelation};
pub use message::{ChatTurn, Role};
pub use notify::Notifier;
pub use store::{AuditRecord, ChatRecord, ChatStore, KnowledgeStore, UsageRecord};
pub use stream::{StreamEvent, TokenCounts};
pub use tokens::{estimate_tokens, estimate_turn_tokens};
