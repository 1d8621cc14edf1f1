//! The chat orchestrator: one user turn through the provider failover chain.
//!
//! For each turn the orchestrator:
//!
//! 1. **Routes** the request to a provider, by name or, for `auto`, by the
//!    agent whose keywords match the message
//! 2. **Records** the user turn in the primary provider's history
//! 3. **Tries** the primary provider, then its configured fallback. Each
//!    attempt gets its own enriched system prompt and history trimmed to
//!    its context ceiling; chunks are relayed to the caller as they arrive
//! 4. **Finishes** by storing the reply, logging usage and handing the
//!    exchange to knowledge extraction in the background
//!
//! A turn always produces a non-empty reply. When every attempt fails, the
//! last error becomes the reply, tagged with the provider it came from.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use switchboard_config::{AUTO_PROVIDER, AppConfig};
use switchboard_core::error::{ProviderError, StoreError};
use switchboard_core::message::ChatTurn;
use switchboard_core::notify::Notifier;
use switchboard_core::store::{AuditRecord, ChatStore, KnowledgeStore, UsageRecord};
use switchboard_core::stream::{StreamEvent, TokenCounts};
use switchboard_memory::{MemoryEnricher, spawn_record_turn};
use switchboard_providers::{HttpTransport, ProviderRouter, StreamTransport};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::build_context;
use crate::session::ChatSession;

/// Audit details are clipped to this many characters.
const AUDIT_DETAIL_LIMIT: usize = 200;

/// Receives reply text as it streams.
#[async_trait]
pub trait ReplySink: Send {
    async fn chunk(&mut self, text: &str);
}

/// Collects chunks in memory.
#[async_trait]
impl ReplySink for Vec<String> {
    async fn chunk(&mut self, text: &str) {
        self.push(text.to_string());
    }
}

/// Result of one completed turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    /// Provider that produced the reply, or the last one tried on failure
    pub provider: String,
    /// Agent picked by `auto` routing
    pub agent: Option<String>,
    pub reply: String,
    pub succeeded: bool,
    /// Zero-based position in the chain of the attempt that answered
    pub attempt: usize,
    pub counts: TokenCounts,
    pub latency_ms: u64,
}

/// Where a turn goes first.
struct Route {
    primary: String,
    agent: Option<String>,
    /// Agent prompt, used for every attempt in place of the provider's own
    prompt: Option<String>,
}

/// What a single attempt produced.
enum Attempt {
    Replied { text: String, model: String },
    Failed(String),
}

pub struct ChatOrchestrator {
    config: Arc<AppConfig>,
    router: ProviderRouter,
    chats: Arc<dyn ChatStore>,
    knowledge: Arc<dyn KnowledgeStore>,
    enricher: Arc<MemoryEnricher>,
    notifier: Arc<dyn Notifier>,
    transport: Arc<dyn StreamTransport>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl ChatOrchestrator {
    pub fn new(
        config: Arc<AppConfig>,
        router: ProviderRouter,
        chats: Arc<dyn ChatStore>,
        knowledge: Arc<dyn KnowledgeStore>,
        enricher: Arc<MemoryEnricher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            router,
            chats,
            knowledge,
            enricher,
            notifier,
            transport: Arc::new(HttpTransport),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Replace the HTTP transport (scripted backends in tests).
    pub fn with_transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn chats(&self) -> &Arc<dyn ChatStore> {
        &self.chats
    }

    /// A fresh session for a connection on `channel`.
    pub fn new_session(&self, channel: impl Into<String>) -> ChatSession {
        ChatSession::new(
            channel,
            self.config.memory.enabled,
            self.config.history.clone(),
        )
    }

    /// Primary provider followed by its fallback, if one is configured.
    pub fn failover_chain(&self, primary: &str) -> Vec<String> {
        let mut chain = vec![primary.to_string()];
        if let Some(fallback) = self.config.fallback_for(primary) {
            if fallback != primary {
                chain.push(fallback.to_string());
            }
        }
        chain
    }

    /// Delete a knowledge entity and its relations, then drop the cached
    /// memory blocks so the next prompt no longer mentions it.
    pub async fn forget_entity(&self, id: i64) -> Result<bool, StoreError> {
        let deleted = self.knowledge.delete_entity(id).await?;
        if deleted {
            self.enricher.invalidate_knowledge().await;
            info!(entity_id = id, "Knowledge entity deleted");
        }
        Ok(deleted)
    }

    fn route(&self, requested: &str, user_text: &str) -> Route {
        if requested.trim() != AUTO_PROVIDER {
            return Route {
                primary: self.config.resolve_provider(requested),
                agent: None,
                prompt: None,
            };
        }
        let picked = self
            .config
            .detect_agent(user_text)
            .and_then(|id| self.config.agents.get(id).map(|agent| (id, agent)));
        match picked {
            Some((id, agent)) => {
                debug!(agent = %id, provider = %agent.provider, "Auto routing picked agent");
                Route {
                    primary: self.config.resolve_provider(&agent.provider),
                    agent: Some(id.to_string()),
                    prompt: agent.system_prompt.clone(),
                }
            }
            None => Route {
                primary: self.config.default_provider.clone(),
                agent: None,
                prompt: None,
            },
        }
    }

    /// Run one user turn.
    ///
    /// `requested_provider` may be a provider id, an alias, `auto` or
    /// anything else; unknown names use the default provider.
    pub async fn execute(
        &self,
        session: &mut ChatSession,
        requested_provider: &str,
        user_text: &str,
        sink: &mut dyn ReplySink,
    ) -> ChatOutcome {
        let start = Instant::now();
        let route = self.route(requested_provider, user_text);
        let primary = route.primary.clone();
        let channel = session.channel().to_string();
        let memory_enabled = session.memory_enabled();

        info!(
            provider = %primary,
            agent = route.agent.as_deref().unwrap_or(""),
            channel = %channel,
            memory = memory_enabled,
            "Chat turn started"
        );

        let history = session.history(&primary, self.chats.as_ref()).await;
        let user_turn = ChatTurn::user(user_text);
        self.persist(&primary, &channel, &user_turn).await;
        history.push(user_turn);

        let chain = self.failover_chain(&primary);
        // Counts always belong to the last provider tried.
        let mut counts = TokenCounts::default();
        let mut last_error = String::new();
        let mut answered: Option<(usize, String, String)> = None;
        let mut provider = primary.clone();

        for (attempt, pid) in chain.iter().enumerate() {
            provider = pid.clone();
            counts = TokenCounts::default();

            let base_prompt = route
                .prompt
                .as_deref()
                .unwrap_or_else(|| self.config.system_prompt_for(pid));
            let system_prompt = self
                .enricher
                .enrich(base_prompt, memory_enabled, user_text, pid)
                .await;
            let context = build_context(
                history.turns(),
                self.config.context_budget(pid),
                &system_prompt,
            );
            let descriptor = self
                .router
                .build_descriptor(pid, None, &system_prompt, context);

            if let Some(reason) = descriptor.invalid_reason() {
                last_error = ProviderError::ConfigInvalid(reason.to_string()).to_string();
                warn!(provider = %pid, attempt, reason = %reason, "Provider not usable, skipping");
                continue;
            }

            if attempt > 0 {
                sink.chunk(&format!("\n[failover → {pid}]\n")).await;
            }

            debug!(provider = %pid, attempt, turns = context.len(), "Dispatching attempt");
            match self.stream_attempt(descriptor, sink, &mut counts).await {
                Attempt::Replied { text, model } => {
                    answered = Some((attempt, text, model));
                    break;
                }
                Attempt::Failed(error) => {
                    warn!(provider = %pid, attempt, error = %error, "Attempt failed");
                    last_error = error;
                }
            }
        }

        let (attempt, reply, model, succeeded) = match answered {
            Some((attempt, text, model)) => (attempt, text, model, true),
            None => {
                let reply = format!("(error {provider}: {last_error})");
                sink.chunk(&reply).await;
                (chain.len().saturating_sub(1), reply, String::new(), false)
            }
        };

        history.push(ChatTurn::assistant(reply.clone()));
        self.persist(&provider, &channel, &ChatTurn::assistant(reply.clone()))
            .await;

        if succeeded && attempt > 0 {
            self.record_failover(&primary, &provider, &channel, &last_error)
                .await;
        }

        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let usage = UsageRecord {
            ts: chrono::Utc::now(),
            provider: provider.clone(),
            model,
            channel: channel.clone(),
            input_tokens: counts.input_tokens,
            output_tokens: counts.output_tokens,
            latency_ms,
            succeeded,
        };
        if let Err(e) = self.chats.log_usage(&usage).await {
            warn!(provider = %provider, error = %e, "Failed to log usage");
        }

        self.track(spawn_record_turn(
            Arc::clone(&self.knowledge),
            user_text.to_string(),
            reply.clone(),
        ));

        info!(
            provider = %provider,
            attempt,
            succeeded,
            latency_ms,
            input_tokens = counts.input_tokens,
            output_tokens = counts.output_tokens,
            "Chat turn finished"
        );

        ChatOutcome {
            provider,
            agent: route.agent,
            reply,
            succeeded,
            attempt,
            counts,
            latency_ms,
        }
    }

    /// Drain one attempt's events, relaying chunks as they arrive.
    async fn stream_attempt(
        &self,
        descriptor: switchboard_providers::ProviderDescriptor,
        sink: &mut dyn ReplySink,
        counts: &mut TokenCounts,
    ) -> Attempt {
        let pid = descriptor.id.clone();
        let model = descriptor.model.clone();
        let mut rx = self.transport.open(descriptor);
        let mut text = String::new();
        let mut error: Option<String> = None;

        while let Some(event) = rx.recv().await {
            match event {
                StreamEvent::Chunk(fragment) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    sink.chunk(&fragment).await;
                    text.push_str(&fragment);
                }
                StreamEvent::Meta(observed) => counts.merge(observed),
                StreamEvent::Error(message) => error = Some(message),
                StreamEvent::End => break,
            }
        }

        if text.is_empty() {
            return Attempt::Failed(
                error.unwrap_or_else(|| ProviderError::EmptyReply(pid).to_string()),
            );
        }
        if let Some(late) = error {
            debug!(provider = %pid, error = %late, "Keeping partial reply despite late error");
        }
        Attempt::Replied { text, model }
    }

    /// Wait for background work spawned by earlier turns (knowledge
    /// extraction, notifications). Used before a short-lived process exits.
    pub async fn finish_background(&self) {
        let pending = match self.background.lock() {
            Ok(mut handles) => std::mem::take(&mut *handles),
            Err(_) => return,
        };
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task failed");
            }
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut handles) = self.background.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
    }

    async fn persist(&self, provider: &str, channel: &str, turn: &ChatTurn) {
        if let Err(e) = self.chats.append_turn(provider, channel, turn).await {
            warn!(provider = %provider, channel = %channel, error = %e, "Failed to store chat turn");
        }
    }

    async fn record_failover(&self, primary: &str, fallback: &str, channel: &str, cause: &str) {
        let notifier = Arc::clone(&self.notifier);
        let message = format!("Provider failover: {primary} → {fallback}");
        self.track(tokio::spawn(async move {
            if let Err(e) = notifier.notify(&message).await {
                warn!(notifier = notifier.name(), error = %e, "Failover notification failed");
            }
        }));

        let details: String = cause.chars().take(AUDIT_DETAIL_LIMIT).collect();
        let record = AuditRecord::new(
            "failover",
            channel,
            format!("{primary} → {fallback}"),
            "ok",
            details,
        );
        if let Err(e) = self.chats.log_audit(&record).await {
            warn!(error = %e, "Failed to write failover audit record");
        }
    }
}
