//! System prompt enrichment.
//!
//! Appended to the base prompt, in order:
//! 1. today's date
//! 2. the static friends block, if a file is configured
//! 3. with memory on: the knowledge summary, the latest digest and the
//!    episodic recall block
//!
//! Each memory block is cached with its own TTL. Recall depends on the
//! message, so its cache is keyed by the frequent entities the message
//! mentions; the frequency filter itself runs on every call. Recall is only
//! built for providers whose context ceiling leaves room for it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use switchboard_config::{AppConfig, DEFAULT_CONTEXT_BUDGET, MemoryConfig};
use switchboard_core::error::StoreError;
use switchboard_core::knowledge::{EntityKind, KnowledgeEntity};
use switchboard_core::message::Role;
use switchboard_core::store::{ChatStore, KnowledgeStore};
use switchboard_core::tokens::estimate_tokens;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::extract::extract_entities;

const KNOWLEDGE_SAMPLE: usize = 30;
const MAX_TECH: usize = 8;
const MAX_PEOPLE: usize = 5;
const MAX_PLACES: usize = 5;
const SNIPPET_MAX_CHARS: usize = 200;
const SNIPPET_MIN_CHARS: usize = 20;
/// Distinct keyword sets kept in the recall cache before it is reset.
const RECALL_CACHE_ENTRIES: usize = 64;

pub struct MemoryEnricher {
    config: MemoryConfig,
    budgets: BTreeMap<String, usize>,
    knowledge: Arc<dyn KnowledgeStore>,
    chats: Arc<dyn ChatStore>,
    friends: Option<String>,
    knowledge_block: TtlCache<String>,
    digest_block: TtlCache<String>,
    recall_blocks: Mutex<HashMap<Vec<String>, Arc<TtlCache<String>>>>,
}

impl MemoryEnricher {
    pub fn new(
        config: &AppConfig,
        knowledge: Arc<dyn KnowledgeStore>,
        chats: Arc<dyn ChatStore>,
    ) -> Self {
        let budgets = config
            .providers
            .keys()
            .map(|id| (id.clone(), config.context_budget(id)))
            .collect();
        Self {
            config: config.memory.clone(),
            budgets,
            knowledge,
            chats,
            friends: None,
            knowledge_block: TtlCache::new(),
            digest_block: TtlCache::new(),
            recall_blocks: Mutex::new(HashMap::new()),
        }
    }

    /// Build an enricher and load the friends file named in configuration.
    pub async fn from_config(
        config: &AppConfig,
        knowledge: Arc<dyn KnowledgeStore>,
        chats: Arc<dyn ChatStore>,
    ) -> Self {
        let friends = match config.memory.friends_file.as_deref() {
            Some(path) => load_friends(path).await,
            None => None,
        };
        Self::new(config, knowledge, chats).with_friends(friends)
    }

    pub fn with_friends(mut self, friends: Option<String>) -> Self {
        self.friends = friends.filter(|text| !text.trim().is_empty());
        self
    }

    /// The system prompt to send to `provider_id` for `user_message`.
    pub async fn enrich(
        &self,
        base_prompt: &str,
        memory_enabled: bool,
        user_message: &str,
        provider_id: &str,
    ) -> String {
        let mut prompt = base_prompt.trim_end().to_string();
        push_block(
            &mut prompt,
            &format!("Today is {}.", Local::now().format("%A %d %B %Y")),
        );

        if let Some(friends) = &self.friends {
            push_block(&mut prompt, &format!("## Friends\n{}", friends.trim()));
        }

        if !memory_enabled {
            return prompt;
        }

        push_block(&mut prompt, &self.knowledge_summary().await);
        push_block(&mut prompt, &self.digest_summary().await);
        push_block(&mut prompt, &self.recall(user_message, provider_id).await);
        prompt
    }

    /// Drop the blocks derived from stored entities so the next prompt
    /// reflects an edit to the knowledge graph.
    pub async fn invalidate_knowledge(&self) {
        self.knowledge_block.invalidate().await;
        self.recall_blocks.lock().await.clear();
    }

    async fn knowledge_summary(&self) -> String {
        let ttl = Duration::from_secs(self.config.knowledge_ttl_secs);
        let block = self
            .knowledge_block
            .get_or_refresh(ttl, || async {
                let entities = self.knowledge.list_entities(None, KNOWLEDGE_SAMPLE).await?;
                Ok::<_, StoreError>(format_knowledge(&entities))
            })
            .await;
        block.unwrap_or_else(|e| {
            warn!(error = %e, "Knowledge block unavailable");
            String::new()
        })
    }

    async fn digest_summary(&self) -> String {
        let ttl = Duration::from_secs(self.config.digest_ttl_secs);
        let block = self
            .digest_block
            .get_or_refresh(ttl, || async {
                let digest = self.knowledge.latest_digest().await?;
                Ok::<_, StoreError>(match digest {
                    Some(d) if !d.summary.trim().is_empty() => format!(
                        "## Weekly digest ({} to {})\n{}",
                        d.week_start.format("%Y-%m-%d"),
                        d.week_end.format("%Y-%m-%d"),
                        d.summary.trim()
                    ),
                    _ => String::new(),
                })
            })
            .await;
        block.unwrap_or_else(|e| {
            warn!(error = %e, "Digest block unavailable");
            String::new()
        })
    }

    /// Episodic recall: past assistant replies about frequently discussed
    /// entities that the current message mentions.
    async fn recall(&self, user_message: &str, provider_id: &str) -> String {
        let budget = self
            .budgets
            .get(provider_id)
            .copied()
            .unwrap_or(DEFAULT_CONTEXT_BUDGET);
        if budget < self.config.recall_min_budget {
            debug!(provider = %provider_id, budget, "Skipping recall on a small context");
            return String::new();
        }

        let keywords = self.recall_keywords(user_message).await;
        if keywords.is_empty() {
            return String::new();
        }

        let cache = {
            let mut blocks = self.recall_blocks.lock().await;
            if blocks.len() >= RECALL_CACHE_ENTRIES && !blocks.contains_key(&keywords) {
                blocks.clear();
            }
            Arc::clone(blocks.entry(keywords.clone()).or_default())
        };
        let ttl = Duration::from_secs(self.config.recall_ttl_secs);
        let block = cache
            .get_or_refresh(ttl, || self.build_recall(&keywords))
            .await;
        block.unwrap_or_else(|e| {
            warn!(error = %e, "Recall block unavailable");
            String::new()
        })
    }

    /// Entities in the message that have been mentioned often enough, in
    /// extraction order, at most `recall_max_keywords` of them.
    async fn recall_keywords(&self, user_message: &str) -> Vec<String> {
        let mut keywords = Vec::new();
        for entity in extract_entities(user_message, "") {
            if keywords.len() >= self.config.recall_max_keywords {
                break;
            }
            match self.knowledge.find_entity(&entity.name).await {
                Ok(Some(known)) if known.frequency >= self.config.recall_min_frequency => {
                    keywords.push(entity.name);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, entity = %entity.name, "Entity lookup failed"),
            }
        }
        keywords
    }

    async fn build_recall(&self, keywords: &[String]) -> Result<String, StoreError> {
        let mut snippets = Vec::new();
        let mut tokens_used = 0;
        let mut failures = 0;
        'keywords: for keyword in keywords {
            let hits = match self
                .chats
                .search_chat(keyword, self.config.recall_hits_per_keyword)
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(error = %e, keyword = %keyword, "Recall search failed");
                    failures += 1;
                    if failures == keywords.len() {
                        return Err(e);
                    }
                    continue;
                }
            };

            for hit in hits.iter().filter(|h| h.role == Role::Assistant) {
                let text = clip_chars(&hit.content, SNIPPET_MAX_CHARS);
                let text = text.trim();
                if text.chars().count() < SNIPPET_MIN_CHARS {
                    continue;
                }
                let cost = estimate_tokens(text);
                if tokens_used + cost > self.config.recall_max_tokens {
                    break;
                }
                snippets.push(format!("- [{}] {}", hit.ts.format("%Y-%m-%d"), text));
                tokens_used += cost;
                if snippets.len() >= self.config.recall_max_snippets {
                    break 'keywords;
                }
            }
        }

        if snippets.is_empty() {
            return Ok(String::new());
        }
        debug!(snippets = snippets.len(), tokens = tokens_used, "Recall block built");
        Ok(format!("## Context from past conversations\n{}", snippets.join("\n")))
    }
}

/// Read the friends file once; failures are logged and leave the block out.
pub async fn load_friends(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Ok(_) => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read friends file");
            None
        }
    }
}

fn format_knowledge(entities: &[KnowledgeEntity]) -> String {
    let names = |kind: EntityKind, max: usize| -> Vec<&str> {
        entities
            .iter()
            .filter(|e| e.kind == kind)
            .take(max)
            .map(|e| e.name.as_str())
            .collect()
    };
    let tech = names(EntityKind::Tech, MAX_TECH);
    let people = names(EntityKind::Person, MAX_PEOPLE);
    let places = names(EntityKind::Place, MAX_PLACES);
    if tech.is_empty() && people.is_empty() && places.is_empty() {
        return String::new();
    }

    let mut lines = vec!["## What you remember about the user".to_string()];
    if !tech.is_empty() {
        lines.push(format!("- Tech interests: {}", tech.join(", ")));
    }
    if !people.is_empty() {
        lines.push(format!("- People mentioned: {}", people.join(", ")));
    }
    if !places.is_empty() {
        lines.push(format!("- Places mentioned: {}", places.join(", ")));
    }
    lines.join("\n")
}

fn push_block(prompt: &mut String, block: &str) {
    if block.is_empty() {
        return;
    }
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str(block);
}

fn clip_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
