//! SQLite store.
//!
//! One database file holds every table:
//! - `chat_messages`: conversation turns keyed by (provider, channel)
//! - `usage_log`, `audit_log`: append-only operational records
//! - `entities`, `relations`: the knowledge graph
//! - `digests`: periodic summaries written by an external job
//!
//! Tables are created at open time when missing. Timestamps are stored as
//! fixed-width RFC 3339 text so that they sort lexically.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use switchboard_config::StorageConfig;
use switchboard_core::error::StoreError;
use switchboard_core::knowledge::{DigestRecord, EntityKind, KnowledgeEntity, KnowledgeRelation};
use switchboard_core::message::{ChatTurn, Role};
use switchboard_core::store::{AuditRecord, ChatRecord, ChatStore, KnowledgeStore, UsageRecord};
use tracing::{debug, info};

const SCHEMA: &[(&str, &str)] = &[
    (
        "chat_messages table",
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            ts        TEXT NOT NULL,
            provider  TEXT NOT NULL,
            channel   TEXT NOT NULL,
            role      TEXT NOT NULL,
            content   TEXT NOT NULL
        )
        "#,
    ),
    (
        "chat_messages index",
        "CREATE INDEX IF NOT EXISTS idx_chat_provider_channel ON chat_messages(provider, channel, id)",
    ),
    (
        "usage_log table",
        r#"
        CREATE TABLE IF NOT EXISTS usage_log (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            ts             TEXT NOT NULL,
            provider       TEXT NOT NULL,
            model          TEXT NOT NULL,
            channel        TEXT NOT NULL,
            input_tokens   INTEGER NOT NULL DEFAULT 0,
            output_tokens  INTEGER NOT NULL DEFAULT 0,
            latency_ms     INTEGER NOT NULL DEFAULT 0,
            succeeded      INTEGER NOT NULL DEFAULT 1
        )
        "#,
    ),
    (
        "audit_log table",
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            ts        TEXT NOT NULL,
            action    TEXT NOT NULL,
            actor     TEXT NOT NULL,
            resource  TEXT NOT NULL,
            status    TEXT NOT NULL,
            details   TEXT NOT NULL DEFAULT ''
        )
        "#,
    ),
    (
        "audit_log index",
        "CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log(action, id)",
    ),
    (
        "entities table",
        r#"
        CREATE TABLE IF NOT EXISTS entities (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            kind        TEXT NOT NULL,
            name        TEXT NOT NULL,
            name_key    TEXT NOT NULL UNIQUE,
            frequency   INTEGER NOT NULL DEFAULT 1,
            first_seen  TEXT NOT NULL,
            last_seen   TEXT NOT NULL
        )
        "#,
    ),
    (
        "relations table",
        r#"
        CREATE TABLE IF NOT EXISTS relations (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_a   INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            entity_b   INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            label      TEXT NOT NULL,
            frequency  INTEGER NOT NULL DEFAULT 1,
            ts         TEXT NOT NULL,
            UNIQUE(entity_a, entity_b, label)
        )
        "#,
    ),
    (
        "digests table",
        r#"
        CREATE TABLE IF NOT EXISTS digests (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            week_start  TEXT NOT NULL,
            week_end    TEXT NOT NULL,
            summary     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        )
        "#,
    ),
];

/// The production store: chat history, usage, audit and knowledge in one
/// SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url`.
    ///
    /// `sqlite::memory:` gives a private in-process database; the pool is
    /// then held to a single connection so every query sees the same data.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.create_tables().await?;
        info!(url = %url, "SQLite store ready");
        Ok(store)
    }

    /// Open the database named by configuration, creating its directory.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.as_deref().and_then(|p| p.parent()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Storage(format!("{}: {e}", parent.display())))?;
        } else if config.path.is_none() {
            let dir = switchboard_config::AppConfig::config_dir();
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::Storage(format!("{}: {e}", dir.display())))?;
        }
        Self::open(&config.database_url()).await
    }

    /// A throwaway in-memory database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    async fn create_tables(&self) -> Result<(), StoreError> {
        for (what, sql) in SCHEMA {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{what}: {e}")))?;
        }
        debug!("SQLite schema ready");
        Ok(())
    }
}

// --- Row helpers ---

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn count_column(row: &SqliteRow, name: &str) -> Result<u32, StoreError> {
    let value: i64 = column(row, name)?;
    Ok(u32::try_from(value).unwrap_or(0))
}

fn row_to_turn(row: &SqliteRow) -> Result<ChatTurn, StoreError> {
    let role: String = column(row, "role")?;
    let role = Role::from_str(&role).map_err(StoreError::QueryFailed)?;
    Ok(ChatTurn {
        role,
        content: column(row, "content")?,
    })
}

fn row_to_chat_record(row: &SqliteRow) -> Result<ChatRecord, StoreError> {
    let role: String = column(row, "role")?;
    let ts: String = column(row, "ts")?;
    Ok(ChatRecord {
        id: column(row, "id")?,
        ts: parse_timestamp(&ts),
        provider: column(row, "provider")?,
        channel: column(row, "channel")?,
        role: Role::from_str(&role).map_err(StoreError::QueryFailed)?,
        content: column(row, "content")?,
    })
}

fn row_to_entity(row: &SqliteRow) -> Result<KnowledgeEntity, StoreError> {
    let kind: String = column(row, "kind")?;
    let first_seen: String = column(row, "first_seen")?;
    let last_seen: String = column(row, "last_seen")?;
    Ok(KnowledgeEntity {
        id: column(row, "id")?,
        kind: EntityKind::from_str(&kind).map_err(StoreError::QueryFailed)?,
        name: column(row, "name")?,
        frequency: column(row, "frequency")?,
        first_seen: parse_timestamp(&first_seen),
        last_seen: parse_timestamp(&last_seen),
    })
}

fn row_to_relation(row: &SqliteRow) -> Result<KnowledgeRelation, StoreError> {
    Ok(KnowledgeRelation {
        id: column(row, "id")?,
        entity_a: column(row, "entity_a")?,
        entity_b: column(row, "entity_b")?,
        label: column(row, "label")?,
        frequency: column(row, "frequency")?,
    })
}

fn row_to_digest(row: &SqliteRow) -> Result<DigestRecord, StoreError> {
    let week_start: String = column(row, "week_start")?;
    let week_end: String = column(row, "week_end")?;
    let created_at: String = column(row, "created_at")?;
    Ok(DigestRecord {
        week_start: parse_timestamp(&week_start),
        week_end: parse_timestamp(&week_end),
        summary: column(row, "summary")?,
        created_at: parse_timestamp(&created_at),
    })
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'`.
fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn append_turn(
        &self,
        provider: &str,
        channel: &str,
        turn: &ChatTurn,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chat_messages (ts, provider, channel, role, content) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(timestamp(&Utc::now()))
        .bind(provider)
        .bind(channel)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT chat_messages failed: {e}")))?;
        Ok(())
    }

    async fn load_history(
        &self,
        provider: &str,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<ChatTurn>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT role, content FROM (
                SELECT id, role, content FROM chat_messages
                WHERE provider = ?1 AND channel = ?2
                ORDER BY id DESC
                LIMIT ?3
            )
            ORDER BY id ASC
            "#,
        )
        .bind(provider)
        .bind(channel)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("load history: {e}")))?;

        rows.iter().map(row_to_turn).collect()
    }

    async fn clear_channel(&self, channel: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE channel = ?1")
            .bind(channel)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE chat_messages failed: {e}")))?;
        Ok(result.rows_affected())
    }

    async fn search_chat(
        &self,
        keyword: &str,
        limit: usize,
    ) -> Result<Vec<ChatRecord>, StoreError> {
        if keyword.trim().is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT id, ts, provider, channel, role, content FROM chat_messages
            WHERE content LIKE ?1 ESCAPE '\'
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(like_pattern(keyword.trim()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("chat search: {e}")))?;

        rows.iter().map(row_to_chat_record).collect()
    }

    async fn log_usage(&self, record: &UsageRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO usage_log
                (ts, provider, model, channel, input_tokens, output_tokens, latency_ms, succeeded)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(timestamp(&record.ts))
        .bind(&record.provider)
        .bind(&record.model)
        .bind(&record.channel)
        .bind(i64::from(record.input_tokens))
        .bind(i64::from(record.output_tokens))
        .bind(i64::try_from(record.latency_ms).unwrap_or(i64::MAX))
        .bind(record.succeeded)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT usage_log failed: {e}")))?;
        Ok(())
    }

    async fn recent_usage(&self, limit: usize) -> Result<Vec<UsageRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM usage_log ORDER BY id DESC LIMIT ?1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("usage query: {e}")))?;

        rows.iter()
            .map(|row| {
                let ts: String = column(row, "ts")?;
                let latency_ms: i64 = column(row, "latency_ms")?;
                Ok(UsageRecord {
                    ts: parse_timestamp(&ts),
                    provider: column(row, "provider")?,
                    model: column(row, "model")?,
                    channel: column(row, "channel")?,
                    input_tokens: count_column(row, "input_tokens")?,
                    output_tokens: count_column(row, "output_tokens")?,
                    latency_ms: u64::try_from(latency_ms).unwrap_or(0),
                    succeeded: column(row, "succeeded")?,
                })
            })
            .collect()
    }

    async fn log_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (ts, action, actor, resource, status, details)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(timestamp(&record.ts))
        .bind(&record.action)
        .bind(&record.actor)
        .bind(&record.resource)
        .bind(&record.status)
        .bind(&record.details)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT audit_log failed: {e}")))?;
        Ok(())
    }

    async fn audit_records(
        &self,
        action: Option<&str>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT ts, action, actor, resource, status, details FROM audit_log
            WHERE (?1 IS NULL OR action = ?1)
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(action)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("audit query: {e}")))?;

        rows.iter()
            .map(|row| {
                let ts: String = column(row, "ts")?;
                Ok(AuditRecord {
                    ts: parse_timestamp(&ts),
                    action: column(row, "action")?,
                    actor: column(row, "actor")?,
                    resource: column(row, "resource")?,
                    status: column(row, "status")?,
                    details: column(row, "details")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn upsert_entity(&self, kind: EntityKind, name: &str) -> Result<i64, StoreError> {
        let name = name.trim();
        let now = timestamp(&Utc::now());
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO entities (kind, name, name_key, frequency, first_seen, last_seen)
            VALUES (?1, ?2, ?3, 1, ?4, ?4)
            ON CONFLICT(name_key) DO UPDATE SET
                frequency = frequency + 1,
                last_seen = excluded.last_seen
            RETURNING id
            "#,
        )
        .bind(kind.as_str())
        .bind(name)
        .bind(name_key(name))
        .bind(&now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT entities failed: {e}")))?;

        debug!(entity_id = id, kind = %kind, name = %name, "Entity upserted");
        Ok(id)
    }

    async fn find_entity(&self, name: &str) -> Result<Option<KnowledgeEntity>, StoreError> {
        let row = sqlx::query("SELECT * FROM entities WHERE name_key = ?1")
            .bind(name_key(name))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("entity lookup: {e}")))?;
        row.as_ref().map(row_to_entity).transpose()
    }

    async fn list_entities(
        &self,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<KnowledgeEntity>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM entities
            WHERE (?1 IS NULL OR kind = ?1)
            ORDER BY frequency DESC, last_seen DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(kind.map(|k| k.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("entity list: {e}")))?;

        rows.iter().map(row_to_entity).collect()
    }

    async fn delete_entity(&self, id: i64) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query("DELETE FROM relations WHERE entity_a = ?1 OR entity_b = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE relations failed: {e}")))?;
        let deleted = sqlx::query("DELETE FROM entities WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE entities failed: {e}")))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        if deleted > 0 {
            info!(entity_id = id, "Entity deleted with its relations");
        }
        Ok(deleted > 0)
    }

    async fn add_relation(
        &self,
        entity_a: i64,
        entity_b: i64,
        label: &str,
    ) -> Result<i64, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO relations (entity_a, entity_b, label, frequency, ts)
            VALUES (?1, ?2, ?3, 1, ?4)
            ON CONFLICT(entity_a, entity_b, label) DO UPDATE SET
                frequency = frequency + 1,
                ts = excluded.ts
            RETURNING id
            "#,
        )
        .bind(entity_a)
        .bind(entity_b)
        .bind(label)
        .bind(timestamp(&Utc::now()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPSERT relations failed: {e}")))?;
        Ok(id)
    }

    async fn relations_for(&self, entity_id: i64) -> Result<Vec<KnowledgeRelation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, entity_a, entity_b, label, frequency FROM relations
            WHERE entity_a = ?1 OR entity_b = ?1
            ORDER BY frequency DESC, id ASC
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("relation query: {e}")))?;

        rows.iter().map(row_to_relation).collect()
    }

    async fn save_digest(&self, digest: &DigestRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO digests (week_start, week_end, summary, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(timestamp(&digest.week_start))
        .bind(timestamp(&digest.week_end))
        .bind(&digest.summary)
        .bind(timestamp(&digest.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT digests failed: {e}")))?;
        Ok(())
    }

    async fn latest_digest(&self) -> Result<Option<DigestRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM digests ORDER BY created_at DESC, id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("digest query: {e}")))?;
        row.as_ref().map(row_to_digest).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn history_roundtrip_oldest_first() {
        let store = test_store().await;
        store
            .append_turn("anthropic", "dashboard", &ChatTurn::user("ciao"))
            .await
            .unwrap();
        store
            .append_turn("anthropic", "dashboard", &ChatTurn::assistant("ciao! come stai?"))
            .await
            .unwrap();
        store
            .append_turn("ollama", "dashboard", &ChatTurn::user("other provider"))
            .await
            .unwrap();

        let turns = store.load_history("anthropic", "dashboard", 40).await.unwrap();
        assert_eq!(
            turns,
            vec![ChatTurn::user("ciao"), ChatTurn::assistant("ciao! come stai?")]
        );
    }

    #[tokio::test]
    async fn load_history_keeps_newest_rows() {
        let store = test_store().await;
        for i in 0..10 {
            store
                .append_turn("ollama", "cli", &ChatTurn::user(format!("msg {i}")))
                .await
                .unwrap();
        }
        let turns = store.load_history("ollama", "cli", 3).await.unwrap();
        let contents: Vec<_> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 7", "msg 8", "msg 9"]);
    }

    #[tokio::test]
    async fn clear_channel_only_touches_that_channel() {
        let store = test_store().await;
        store.append_turn("a", "dashboard", &ChatTurn::user("x")).await.unwrap();
        store.append_turn("b", "dashboard", &ChatTurn::user("y")).await.unwrap();
        store.append_turn("a", "cli", &ChatTurn::user("z")).await.unwrap();

        assert_eq!(store.clear_channel("dashboard").await.unwrap(), 2);
        assert!(store.load_history("a", "dashboard", 10).await.unwrap().is_empty());
        assert_eq!(store.load_history("a", "cli", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_escapes_wildcards() {
        let store = test_store().await;
        store
            .append_turn("a", "c", &ChatTurn::assistant("Docker compose is handy"))
            .await
            .unwrap();
        store
            .append_turn("a", "c", &ChatTurn::user("100% sure"))
            .await
            .unwrap();

        let hits = store.search_chat("docker", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].role, Role::Assistant);

        assert_eq!(store.search_chat("0%", 5).await.unwrap().len(), 1);
        assert!(store.search_chat("_ure", 5).await.unwrap().is_empty());
        assert!(store.search_chat("  ", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_is_case_insensitive() {
        let store = test_store().await;
        let first = store.upsert_entity(EntityKind::Tech, "Python").await.unwrap();
        let second = store.upsert_entity(EntityKind::Tech, "python").await.unwrap();
        assert_eq!(first, second);

        let entities = store.list_entities(None, 10).await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].frequency, 2);
        assert_eq!(entities[0].name, "Python");

        let found = store.find_entity("PYTHON").await.unwrap().unwrap();
        assert_eq!(found.id, first);
    }

    #[tokio::test]
    async fn list_orders_by_frequency_and_filters_kind() {
        let store = test_store().await;
        store.upsert_entity(EntityKind::Tech, "rust").await.unwrap();
        for _ in 0..3 {
            store.upsert_entity(EntityKind::Tech, "docker").await.unwrap();
        }
        store.upsert_entity(EntityKind::Place, "Milano").await.unwrap();

        let all = store.list_entities(None, 10).await.unwrap();
        assert_eq!(all[0].name, "docker");

        let places = store.list_entities(Some(EntityKind::Place), 10).await.unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Milano");
    }

    #[tokio::test]
    async fn delete_entity_cascades_relations() {
        let store = test_store().await;
        let rust = store.upsert_entity(EntityKind::Tech, "rust").await.unwrap();
        let maria = store.upsert_entity(EntityKind::Person, "Maria Rossi").await.unwrap();
        let roma = store.upsert_entity(EntityKind::Place, "Roma").await.unwrap();
        store.add_relation(rust, maria, "co_occurs").await.unwrap();
        store.add_relation(maria, roma, "co_occurs").await.unwrap();
        store.add_relation(rust, roma, "co_occurs").await.unwrap();

        assert!(store.delete_entity(maria).await.unwrap());
        assert!(store.relations_for(maria).await.unwrap().is_empty());
        let remaining = store.relations_for(rust).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].entity_b, roma);

        assert!(!store.delete_entity(maria).await.unwrap());
    }

    #[tokio::test]
    async fn relation_repeat_bumps_frequency() {
        let store = test_store().await;
        let a = store.upsert_entity(EntityKind::Tech, "rust").await.unwrap();
        let b = store.upsert_entity(EntityKind::Tech, "docker").await.unwrap();
        let first = store.add_relation(a, b, "co_occurs").await.unwrap();
        let second = store.add_relation(a, b, "co_occurs").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.relations_for(b).await.unwrap()[0].frequency, 2);
    }

    #[tokio::test]
    async fn usage_and_audit_newest_first() {
        let store = test_store().await;
        for provider in ["anthropic", "openrouter"] {
            store
                .log_usage(&UsageRecord {
                    ts: Utc::now(),
                    provider: provider.into(),
                    model: "m".into(),
                    channel: "dashboard".into(),
                    input_tokens: 10,
                    output_tokens: 5,
                    latency_ms: 1200,
                    succeeded: true,
                })
                .await
                .unwrap();
        }
        let usage = store.recent_usage(10).await.unwrap();
        assert_eq!(usage[0].provider, "openrouter");
        assert_eq!(usage[0].latency_ms, 1200);

        store
            .log_audit(&AuditRecord::new("failover", "orchestrator", "a → b", "ok", ""))
            .await
            .unwrap();
        store
            .log_audit(&AuditRecord::new("forget", "cli", "entity 3", "ok", ""))
            .await
            .unwrap();
        assert_eq!(store.audit_records(None, 10).await.unwrap().len(), 2);
        let failovers = store.audit_records(Some("failover"), 10).await.unwrap();
        assert_eq!(failovers.len(), 1);
        assert_eq!(failovers[0].resource, "a → b");
    }

    #[tokio::test]
    async fn latest_digest_wins() {
        let store = test_store().await;
        assert!(store.latest_digest().await.unwrap().is_none());

        let now = Utc::now();
        for (offset, summary) in [(14, "older"), (7, "newer")] {
            store
                .save_digest(&DigestRecord {
                    week_start: now - Duration::days(offset),
                    week_end: now - Duration::days(offset - 7),
                    summary: summary.into(),
                    created_at: now - Duration::days(offset - 7),
                })
                .await
                .unwrap();
        }
        assert_eq!(store.latest_digest().await.unwrap().unwrap().summary, "newer");
    }

    #[test]
    fn like_pattern_escapes() {
        assert_eq!(like_pattern("a%b_c\\"), "%a\\%b\\_c\\\\%");
    }
}
