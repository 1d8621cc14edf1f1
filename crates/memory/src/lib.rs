//! Durable state and long-term memory for Switchboard.
//!
//! - [`SqliteStore`] and [`InMemoryStore`] implement the core storage traits
//! - [`extract_entities`] and [`record_turn`] feed the knowledge graph
//! - [`MemoryEnricher`] turns stored knowledge into system prompt blocks

pub mod cache;
pub mod enrich;
pub mod extract;
pub mod in_memory;
pub mod knowledge;
pub mod sqlite;

pub use cache::TtlCache;
pub use enrich::{MemoryEnricher, load_friends};
pub use extract::extract_entities;
pub use in_memory::InMemoryStore;
pub use knowledge::{CO_OCCURS, record_turn, spawn_record_turn};
pub use sqlite::SqliteStore;
