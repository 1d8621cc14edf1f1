//! In-memory store, for tests and `--ephemeral` sessions.

use async_trait::async_trait;
use chrono::Utc;
use switchboard_core::error::StoreError;
use switchboard_core::knowledge::{DigestRecord, EntityKind, KnowledgeEntity, KnowledgeRelation};
use switchboard_core::message::ChatTurn;
use switchboard_core::store::{AuditRecord, ChatRecord, ChatStore, KnowledgeStore, UsageRecord};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    chat: Vec<ChatRecord>,
    usage: Vec<UsageRecord>,
    audit: Vec<AuditRecord>,
    entities: Vec<KnowledgeEntity>,
    relations: Vec<KnowledgeRelation>,
    digests: Vec<DigestRecord>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Keeps every table in plain vectors behind one lock.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryStore {
    async fn append_turn(
        &self,
        provider: &str,
        channel: &str,
        turn: &ChatTurn,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let id = tables.next_id();
        tables.chat.push(ChatRecord {
            id,
            ts: Utc::now(),
            provider: provider.into(),
            channel: channel.into(),
            role: turn.role,
            content: turn.content.clone(),
        });
        Ok(())
    }

    async fn load_history(
        &self,
        provider: &str,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, StoreError> {
        let tables = self.tables.read().await;
        let mut turns: Vec<ChatTurn> = tables
            .chat
            .iter()
            .rev()
            .filter(|r| r.provider == provider && r.channel == channel)
            .take(limit)
            .map(|r| ChatTurn {
                role: r.role,
                content: r.content.clone(),
            })
            .collect();
        turns.reverse();
        Ok(turns)
    }

    async fn clear_channel(&self, channel: &str) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.chat.len();
        tables.chat.retain(|r| r.channel != channel);
        Ok((before - tables.chat.len()) as u64)
    }

    async fn search_chat(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        let needle = keyword.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let tables = self.tables.read().await;
        Ok(tables
            .chat
            .iter()
            .rev()
            .filter(|r| r.content.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn log_usage(&self, record: &UsageRecord) -> Result<(), StoreError> {
        self.tables.write().await.usage.push(record.clone());
        Ok(())
    }

    async fn recent_usage(&self, limit: usize) -> Result<Vec<UsageRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.usage.iter().rev().take(limit).cloned().collect())
    }

    async fn log_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.tables.write().await.audit.push(record.clone());
        Ok(())
    }

    async fn audit_records(
        &self,
        action: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .audit
            .iter()
            .rev()
            .filter(|r| action.is_none_or(|a| r.action == a))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryStore {
    async fn upsert_entity(&self, kind: EntityKind, name: &str) -> Result<i64, StoreError> {
        let name = name.trim();
        let key = name.to_lowercase();
        let now = Utc::now();
        let mut tables = self.tables.write().await;

        if let Some(entity) = tables
            .entities
            .iter_mut()
            .find(|e| e.name.to_lowercase() == key)
        {
            entity.frequency += 1;
            entity.last_seen = now;
            return Ok(entity.id);
        }

        let id = tables.next_id();
        tables.entities.push(KnowledgeEntity {
            id,
            kind,
            name: name.into(),
            frequency: 1,
            first_seen: now,
            last_seen: now,
        });
        Ok(id)
    }

    async fn find_entity(&self, name: &str) -> Result<Option<KnowledgeEntity>, StoreError> {
        let key = name.trim().to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables
            .entities
            .iter()
            .find(|e| e.name.to_lowercase() == key)
            .cloned())
    }

    async fn list_entities(
        &self,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntity>, StoreError> {
        let tables = self.tables.read().await;
        let mut entities: Vec<KnowledgeEntity> = tables
            .entities
            .iter()
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .cloned()
            .collect();
        entities.sort_by(|a, b| {
            b.frequency
                .cmp(&a.frequency)
                .then(b.last_seen.cmp(&a.last_seen))
                .then(b.id.cmp(&a.id))
        });
        entities.truncate(limit);
        Ok(entities)
    }

    async fn delete_entity(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.entities.len();
        tables.entities.retain(|e| e.id != id);
        if tables.entities.len() == before {
            return Ok(false);
        }
        tables
            .relations
            .retain(|r| r.entity_a != id && r.entity_b != id);
        Ok(true)
    }

    async fn add_relation(
        &self,
        entity_a: i64,
        entity_b: i64,
        label: &str,
    ) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let known = |id: i64| tables.entities.iter().any(|e| e.id == id);
        if !known(entity_a) || !known(entity_b) {
            return Err(StoreError::Storage(format!(
                "relation references unknown entity ({entity_a}, {entity_b})"
            )));
        }

        if let Some(relation) = tables
            .relations
            .iter_mut()
            .find(|r| r.entity_a == entity_a && r.entity_b == entity_b && r.label == label)
        {
            relation.frequency += 1;
            return Ok(relation.id);
        }

        let id = tables.next_id();
        tables.relations.push(KnowledgeRelation {
            id,
            entity_a,
            entity_b,
            label: label.into(),
            frequency: 1,
        });
        Ok(id)
    }

    async fn relations_for(&self, entity_id: i64) -> Result<Vec<KnowledgeRelation>, StoreError> {
        let tables = self.tables.read().await;
        let mut relations: Vec<KnowledgeRelation> = tables
            .relations
            .iter()
            .filter(|r| r.entity_a == entity_id || r.entity_b == entity_id)
            .cloned()
            .collect();
        relations.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.id.cmp(&b.id)));
        Ok(relations)
    }

    async fn save_digest(&self, digest: &DigestRecord) -> Result<(), StoreError> {
        self.tables.write().await.digests.push(digest.clone());
        Ok(())
    }

    async fn latest_digest(&self) -> Result<Option<DigestRecord>, StoreError> {
        let tables = self.tables.read().await;
        // max_by_key keeps the last of equal keys, so later inserts win ties
        Ok(tables.digests.iter().max_by_key(|d| d.created_at).cloned())
    }
}
