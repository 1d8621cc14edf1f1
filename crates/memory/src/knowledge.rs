//! Knowledge graph updates after a completed turn.

use std::sync::Arc;

use switchboard_core::error::StoreError;
use switchboard_core::store::KnowledgeStore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::extract::extract_entities;

/// Label linking entities mentioned in the same turn.
pub const CO_OCCURS: &str = "co_occurs";

/// Extract entities from one exchange, upsert them and link every pair.
///
/// Returns the ids of the upserted entities. Pairs are stored with the
/// smaller id first so that the same two entities always share one relation.
pub async fn record_turn(
    store: &dyn KnowledgeStore,
    user_text: &str,
    reply_text: &str,
) -> Result<Vec<i64>, StoreError> {
    let entities = extract_entities(user_text, reply_text);
    let mut ids = Vec::with_capacity(entities.len());
    for entity in &entities {
        ids.push(store.upsert_entity(entity.kind, &entity.name).await?);
    }
    ids.sort_unstable();
    ids.dedup();

    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            store.add_relation(*a, *b, CO_OCCURS).await?;
        }
    }

    debug!(entities = ids.len(), "Knowledge updated from turn");
    Ok(ids)
}

/// Run [`record_turn`] in the background. Failures are logged.
pub fn spawn_record_turn(
    store: Arc<dyn KnowledgeStore>,
    user_text: String,
    reply_text: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = record_turn(store.as_ref(), &user_text, &reply_text).await {
            warn!(error = %e, "Entity extraction failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryStore;
    use switchboard_core::knowledge::EntityKind;

    #[tokio::test]
    async fn upserts_and_links_entities() {
        let store = InMemoryStore::new();
        let ids = record_turn(
            &store,
            "Maria Rossi moved to Berlin for a Rust job",
            "Berlin has a big Rust scene.",
        )
        .await
        .unwrap();
        assert_eq!(ids.len(), 3);

        let maria = store.find_entity("maria rossi").await.unwrap().unwrap();
        assert_eq!(maria.kind, EntityKind::Person);
        let relations = store.relations_for(maria.id).await.unwrap();
        assert_eq!(relations.len(), 2);
        assert!(relations.iter().all(|r| r.label == CO_OCCURS && r.entity_a < r.entity_b));
    }

    #[tokio::test]
    async fn repeat_turn_bumps_frequencies() {
        let store = InMemoryStore::new();
        for _ in 0..2 {
            record_turn(&store, "docker and redis", "").await.unwrap();
        }
        let docker = store.find_entity("docker").await.unwrap().unwrap();
        assert_eq!(docker.frequency, 2);
        let relations = store.relations_for(docker.id).await.unwrap();
        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].frequency, 2);
    }

    #[tokio::test]
    async fn background_task_completes() {
        let store: Arc<dyn KnowledgeStore> = Arc::new(InMemoryStore::new());
        spawn_record_turn(store.clone(), "I love python".into(), String::new())
            .await
            .unwrap();
        assert!(store.find_entity("python").await.unwrap().is_some());
    }
}
