//! Provider router: resolves configured providers into backends once and
//! builds per-call descriptors.

use std::collections::BTreeMap;

use switchboard_config::{AppConfig, ProviderConfig, ProviderKind};
use switchboard_core::message::ChatTurn;

use crate::anthropic::AnthropicBackend;
use crate::bridge::BridgeBackend;
use crate::descriptor::{ProviderDescriptor, WireFormat};
use crate::ollama::OllamaBackend;
use crate::openai_compat::OpenAiCompatBackend;

/// One configured backend, with its kind fixed at construction.
#[derive(Debug, Clone)]
pub enum Backend {
    Anthropic(AnthropicBackend),
    OpenaiCompat(OpenAiCompatBackend),
    Ollama(OllamaBackend),
    Bridge(BridgeBackend),
}

impl Backend {
    pub fn from_config(config: &ProviderConfig) -> Self {
        match config.kind {
            ProviderKind::Anthropic => Backend::Anthropic(AnthropicBackend::from_config(config)),
            ProviderKind::OpenaiCompat => {
                Backend::OpenaiCompat(OpenAiCompatBackend::from_config(config))
            }
            ProviderKind::Ollama => Backend::Ollama(OllamaBackend::from_config(config)),
            ProviderKind::Bridge => Backend::Bridge(BridgeBackend::from_config(config)),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        match self {
            Backend::Anthropic(_) => ProviderKind::Anthropic,
            Backend::OpenaiCompat(_) => ProviderKind::OpenaiCompat,
            Backend::Ollama(_) => ProviderKind::Ollama,
            Backend::Bridge(_) => ProviderKind::Bridge,
        }
    }

    pub fn default_model(&self) -> Option<&str> {
        match self {
            Backend::Anthropic(b) => b.default_model(),
            Backend::OpenaiCompat(b) => b.default_model(),
            Backend::Ollama(b) => b.default_model(),
            Backend::Bridge(b) => b.default_model(),
        }
    }

    pub fn describe(
        &self,
        id: &str,
        model: Option<&str>,
        system_prompt: &str,
        history: &[ChatTurn],
    ) -> ProviderDescriptor {
        match self {
            Backend::Anthropic(b) => b.describe(id, model, system_prompt, history),
            Backend::OpenaiCompat(b) => b.describe(id, model, system_prompt, history),
            Backend::Ollama(b) => b.describe(id, model, system_prompt, history),
            Backend::Bridge(b) => b.describe(id, model, system_prompt, history),
        }
    }
}

/// All configured backends, keyed by provider id.
#[derive(Debug, Clone, Default)]
pub struct ProviderRouter {
    backends: BTreeMap<String, Backend>,
}

impl ProviderRouter {
    /// Register a backend under an id, replacing any previous one.
    pub fn register(&mut self, id: impl Into<String>, backend: Backend) {
        self.backends.insert(id.into(), backend);
    }

    pub fn get(&self, id: &str) -> Option<&Backend> {
        self.backends.get(id)
    }

    /// List all registered provider ids.
    pub fn list(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn default_model(&self, id: &str) -> Option<&str> {
        self.backends.get(id).and_then(Backend::default_model)
    }

    /// Build the descriptor for one attempt.
    ///
    /// Unknown ids produce an invalid descriptor rather than an error, so the
    /// failover chain treats them like any other misconfiguration.
    pub fn build_descriptor(
        &self,
        provider_id: &str,
        model: Option<&str>,
        system_prompt: &str,
        history: &[ChatTurn],
    ) -> ProviderDescriptor {
        match self.backends.get(provider_id) {
            Some(backend) => backend.describe(provider_id, model, system_prompt, history),
            None => ProviderDescriptor::invalid(
                provider_id,
                WireFormat::SseChoices,
                format!("provider '{provider_id}' is not configured"),
            ),
        }
    }
}

/// Build backends from configuration.
pub fn build_from_config(config: &AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::default();
    for (id, provider_config) in &config.providers {
        router.register(id.clone(), Backend::from_config(provider_config));
    }
    router
}
