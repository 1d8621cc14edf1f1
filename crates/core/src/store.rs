//! Persistence traits.
//!
//! The chat core reads and writes durable state only through these two
//! traits. Implementations: SQLite (production) and in-memory (tests,
//! ephemeral runs), both in `switchboard-memory`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::knowledge::{DigestRecord, EntityKind, KnowledgeEntity, KnowledgeRelation};
use crate::message::{ChatTurn, Role};

/// A persisted chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub provider: String,
    pub channel: String,
    pub role: Role,
    pub content: String,
}

/// One completed chat turn's resource usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub ts: DateTime<Utc>,
    pub provider: String,
    pub model: String,
    pub channel: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
    pub succeeded: bool,
}

/// An operator-relevant event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    pub resource: String,
    pub status: String,
    pub details: String,
}

impl AuditRecord {
    pub fn new(
        action: impl Into<String>,
        actor: impl Into<String>,
        resource: impl Into<String>,
        status: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            ts: Utc::now(),
            action: action.into(),
            actor: actor.into(),
            resource: resource.into(),
            status: status.into(),
            details: details.into(),
        }
    }
}

/// Conversation history, usage and audit storage.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Append one turn to the history of `(provider, channel)`.
    async fn append_turn(
        &self,
        provider: &str,
        channel: &str,
        turn: &ChatTurn,
    ) -> Result<(), StoreError>;

    /// The newest `limit` turns of `(provider, channel)`, oldest first.
    async fn load_history(
        &self,
        provider: &str,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, StoreError>;

    /// Delete every stored turn of a channel. Returns the number removed.
    async fn clear_channel(&self, channel: &str) -> Result<u64, StoreError>;

    /// Turns from any provider or channel whose content contains `keyword`
    /// (case-insensitive), newest first.
    async fn search_chat(&self, keyword: &str, limit: usize)
    -> Result<Vec<ChatRecord>, StoreError>;

    async fn log_usage(&self, record: &UsageRecord) -> Result<(), StoreError>;

    /// The newest `limit` usage records, newest first.
    async fn recent_usage(&self, limit: usize) -> Result<Vec<UsageRecord>, StoreError>;

    async fn log_audit(&self, record: &AuditRecord) -> Result<(), StoreError>;

    /// Audit records, newest first, optionally filtered by action.
    async fn audit_records(
        &self,
        action: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, StoreError>;
}

/// Entity, relation and digest storage.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Insert an entity or bump the frequency of the existing one with the
    /// same case-insensitive name. Returns the entity id.
    async fn upsert_entity(&self, kind: EntityKind, name: &str) -> Result<i64, StoreError>;

    /// Case-insensitive lookup by name.
    async fn find_entity(&self, name: &str) -> Result<Option<KnowledgeEntity>, StoreError>;

    /// Entities ordered by frequency (highest first), then recency.
    async fn list_entities(
        &self,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntity>, StoreError>;

    /// Delete an entity together with every relation that references it.
    /// Returns `false` when no such entity exists.
    async fn delete_entity(&self, id: i64) -> Result<bool, StoreError>;

    /// Insert a relation or bump the frequency of an identical one.
    /// Returns the relation id.
    async fn add_relation(&self, entity_a: i64, entity_b: i64, label: &str)
    -> Result<i64, StoreError>;

    /// Relations touching `entity_id`.
    async fn relations_for(&self, entity_id: i64) -> Result<Vec<KnowledgeRelation>, StoreError>;

    async fn save_digest(&self, digest: &DigestRecord) -> Result<(), StoreError>;

    /// The most recently created digest, if any.
    async fn latest_digest(&self) -> Result<Option<DigestRecord>, StoreError>;
}
