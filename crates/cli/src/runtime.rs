//! Shared start-up wiring: configuration, stores and the orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use switchboard_chat::ChatOrchestrator;
use switchboard_config::{AppConfig, ConfigError};
use switchboard_core::error::StoreError;
use switchboard_core::store::{ChatStore, KnowledgeStore};
use switchboard_memory::{InMemoryStore, MemoryEnricher, SqliteStore};
use tracing::info;

/// Global command-line options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub config_path: Option<PathBuf>,
    pub ephemeral: bool,
}

impl Options {
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        match &self.config_path {
            Some(path) => AppConfig::load_from(path),
            None => AppConfig::load(),
        }
    }
}

/// Both store traits, usually backed by one database.
#[derive(Clone)]
pub struct Stores {
    pub chats: Arc<dyn ChatStore>,
    pub knowledge: Arc<dyn KnowledgeStore>,
}

impl Stores {
    pub async fn open(config: &AppConfig, ephemeral: bool) -> Result<Self, StoreError> {
        if ephemeral {
            info!("Using in-memory storage");
            let store = Arc::new(InMemoryStore::new());
            return Ok(Self {
                chats: store.clone(),
                knowledge: store,
            });
        }

        let store = Arc::new(SqliteStore::from_config(&config.storage).await?);
        info!(url = %config.storage.database_url(), "Opened SQLite storage");
        Ok(Self {
            chats: store.clone(),
            knowledge: store,
        })
    }
}

/// Build the orchestrator over `stores` with the configured notifier.
pub async fn build_orchestrator(config: AppConfig, stores: &Stores) -> ChatOrchestrator {
    let config = Arc::new(config);
    let enricher = MemoryEnricher::from_config(
        &config,
        Arc::clone(&stores.knowledge),
        Arc::clone(&stores.chats),
    )
    .await;
    let notifier = switchboard_notify::from_config(&config.notify);
    info!(notifier = notifier.name(), "Operator notifications ready");

    ChatOrchestrator::new(
        Arc::clone(&config),
        switchboard_providers::build_from_config(&config),
        Arc::clone(&stores.chats),
        Arc::clone(&stores.knowledge),
        Arc::new(enricher),
        notifier,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn ephemeral_stores_share_one_backend() {
        let stores = Stores::open(&AppConfig::default(), true).await.unwrap();
        let id = stores
            .knowledge
            .upsert_entity(switchboard_core::EntityKind::Tech, "rust")
            .await
            .unwrap();
        assert!(id > 0);
        assert!(stores.chats.recent_usage(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sqlite_store_opens_under_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.storage.path = Some(dir.path().join("nested").join("chat.db"));

        let stores = Stores::open(&config, false).await.unwrap();
        stores
            .chats
            .append_turn("ollama", "cli", &switchboard_core::ChatTurn::user("hi"))
            .await
            .unwrap();
        assert!(dir.path().join("nested").join("chat.db").exists());
    }

    #[test]
    fn explicit_config_path_is_used() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_provider = \"openrouter\"").unwrap();
        let options = Options {
            config_path: Some(file.path().to_path_buf()),
            ephemeral: true,
        };
        assert_eq!(options.load_config().unwrap().default_provider, "openrouter");
    }

    #[tokio::test]
    async fn orchestrator_uses_loaded_config() {
        let config = AppConfig {
            default_provider: "ollama".into(),
            ..AppConfig::default()
        };
        let stores = Stores::open(&config, true).await.unwrap();
        let orchestrator = build_orchestrator(config, &stores).await;
        assert_eq!(orchestrator.config().default_provider, "ollama");
        assert_eq!(orchestrator.failover_chain("ollama"), vec!["ollama", "ollama_pc"]);
    }
}
