//! Per-connection chat state.

use std::collections::HashMap;

use switchboard_config::HistoryConfig;
use switchboard_core::store::ChatStore;
use tracing::warn;

use crate::history::ConversationHistory;

/// One client connection: its channel name, memory toggle and one history
/// per provider it has talked to.
///
/// Histories are loaded lazily from the store on first use.
#[derive(Debug)]
pub struct ChatSession {
    channel: String,
    memory_enabled: bool,
    history_config: HistoryConfig,
    histories: HashMap<String, ConversationHistory>,
}

impl ChatSession {
    pub fn new(channel: impl Into<String>, memory_enabled: bool, history_config: HistoryConfig) -> Self {
        Self {
            channel: channel.into(),
            memory_enabled,
            history_config,
            histories: HashMap::new(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn memory_enabled(&self) -> bool {
        self.memory_enabled
    }

    /// Flip memory enrichment; returns the new state.
    pub fn toggle_memory(&mut self) -> bool {
        self.memory_enabled = !self.memory_enabled;
        self.memory_enabled
    }

    /// The history for `provider`, loading the newest stored turns the first
    /// time. A failed load starts from an empty history.
    pub async fn history(&mut self, provider: &str, store: &dyn ChatStore) -> &mut ConversationHistory {
        if !self.histories.contains_key(provider) {
            let turns = match store
                .load_history(provider, &self.channel, self.history_config.load_limit)
                .await
            {
                Ok(turns) => turns,
                Err(e) => {
                    warn!(provider = %provider, channel = %self.channel, error = %e, "Could not load history");
                    Vec::new()
                }
            };
            let history = ConversationHistory::from_config(&self.history_config).with_turns(turns);
            self.histories.insert(provider.to_string(), history);
        }
        self.histories
            .entry(provider.to_string())
            .or_insert_with(|| ConversationHistory::from_config(&self.history_config))
    }

    /// Forget every in-memory history and delete this channel's stored
    /// turns. Returns the number of rows removed.
    pub async fn clear(&mut self, store: &dyn ChatStore) -> u64 {
        self.histories.clear();
        match store.clear_channel(&self.channel).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, "Could not clear stored history");
                0
            }
        }
    }
}
