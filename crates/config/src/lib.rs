//! Configuration loading, validation, and management for Switchboard.
//!
//! Loads configuration from `~/.switchboard/config.toml` (or the file named
//! by `SWITCHBOARD_CONFIG`) with environment variable overrides. Validates
//! all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Context ceiling used for providers that do not declare one.
pub const DEFAULT_CONTEXT_BUDGET: usize = 4000;

/// Provider name that asks for keyword routing through `[agents]`.
pub const AUTO_PROVIDER: &str = "auto";

/// Messages shorter than this never pick an agent.
const AGENT_MIN_MESSAGE_CHARS: usize = 3;

/// The root configuration structure.
///
/// Maps directly to `~/.switchboard/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Provider used when a request names none (or an unknown one)
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Base system prompt, before memory enrichment. Providers may
    /// override it with their own `system_prompt`.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Conversation history limits
    #[serde(default)]
    pub history: HistoryConfig,

    /// Memory enrichment settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Persistent store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Operator notifications
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Short names accepted from clients, mapped to provider ids
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,

    /// Provider-specific configurations
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Keyword-routed profiles used when a client asks for `auto`
    #[serde(default = "default_agents")]
    pub agents: BTreeMap<String, AgentConfig>,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_system_prompt() -> String {
    "You are a concise, helpful personal assistant.".into()
}
fn default_small_model_prompt() -> String {
    "You are a personal assistant running on a small local model. \
     Answer briefly and directly."
        .into()
}
fn default_true() -> bool {
    true
}

fn default_aliases() -> BTreeMap<String, String> {
    [
        ("cloud", "anthropic"),
        ("local", "ollama"),
        ("pc", "ollama_pc"),
        ("deepseek", "openrouter"),
    ]
    .into_iter()
    .map(|(alias, target)| (alias.to_string(), target.to_string()))
    .collect()
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();

    providers.insert(
        "anthropic".into(),
        ProviderConfig {
            api_key_env: Some("ANTHROPIC_API_KEY".into()),
            model: Some("claude-haiku-4-5".into()),
            context_budget: Some(6000),
            fallback: Some("openrouter".into()),
            ..ProviderConfig::new(ProviderKind::Anthropic)
        },
    );

    providers.insert(
        "openrouter".into(),
        ProviderConfig {
            api_url: Some("https://openrouter.ai/api/v1".into()),
            api_key_env: Some("OPENROUTER_API_KEY".into()),
            model: Some("deepseek/deepseek-chat".into()),
            context_budget: Some(8000),
            fallback: Some("anthropic".into()),
            provider_order: vec!["ModelRun".into(), "DeepInfra".into()],
            extra_headers: [
                ("HTTP-Referer".to_string(), "http://localhost".to_string()),
                ("X-Title".to_string(), "Switchboard".to_string()),
            ]
            .into_iter()
            .collect(),
            ..ProviderConfig::new(ProviderKind::OpenaiCompat)
        },
    );

    providers.insert(
        "ollama".into(),
        ProviderConfig {
            api_url: Some("http://127.0.0.1:11434".into()),
            model: Some("gemma3:1b".into()),
            context_budget: Some(3000),
            fallback: Some("ollama_pc".into()),
            timeout_secs: 120,
            keep_alive: Some("60m".into()),
            system_prompt: Some(default_small_model_prompt()),
            ..ProviderConfig::new(ProviderKind::Ollama)
        },
    );

    providers.insert(
        "ollama_pc".into(),
        ProviderConfig {
            api_url: Some("http://192.168.1.2:11434".into()),
            model: Some("qwen2.5-coder:14b".into()),
            context_budget: Some(6000),
            fallback: Some("ollama".into()),
            max_tokens: 2048,
            keep_alive: Some("60m".into()),
            ..ProviderConfig::new(ProviderKind::Ollama)
        },
    );

    providers.insert(
        "brain".into(),
        ProviderConfig {
            api_url: Some("http://127.0.0.1:8095".into()),
            api_key_env: Some("BRAIN_TOKEN".into()),
            context_budget: Some(12000),
            timeout_secs: 120,
            ..ProviderConfig::new(ProviderKind::Bridge)
        },
    );

    providers
}

fn default_agents() -> BTreeMap<String, AgentConfig> {
    let agent = |provider: &str, prompt: &str, keywords: &[&str]| AgentConfig {
        provider: provider.to_string(),
        system_prompt: Some(prompt.to_string()),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
    };
    [
        (
            "coder",
            agent(
                "ollama_pc",
                "You are a senior software engineer. Answer with working code and short explanations.",
                &[
                    "code", "debug", "implement", "fix", "function", "class", "import",
                    "algorithm", "bug", "api", "endpoint", "refactor", "python",
                    "javascript", "html", "css", "frontend", "backend", "database",
                    "query", "sql", "git", "commit", "deploy", "unit test", "compile",
                ],
            ),
        ),
        (
            "sysadmin",
            agent(
                "anthropic",
                "You are a careful Linux system administrator. Prefer safe, reversible commands.",
                &[
                    "backup", "cron", "crontab", "reboot", "tmux", "disk", "cpu", "ram",
                    "process", "service", "systemctl", "apt", "pip", "temperature",
                    "monitoring", "uptime", "ssh", "firewall", "permissions",
                ],
            ),
        ),
        (
            "researcher",
            agent(
                "openrouter",
                "You are a thorough researcher. Compare options and state trade-offs.",
                &[
                    "search", "analyze", "summarize", "explain", "compare", "research",
                    "how does", "why", "difference between", "pros and cons",
                    "advantages", "what do you think of",
                ],
            ),
        ),
    ]
    .into_iter()
    .map(|(id, agent)| (id.to_string(), agent))
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            system_prompt: default_system_prompt(),
            history: HistoryConfig::default(),
            memory: MemoryConfig::default(),
            storage: StorageConfig::default(),
            gateway: GatewayConfig::default(),
            notify: NotifyConfig::default(),
            aliases: default_aliases(),
            providers: default_providers(),
            agents: default_agents(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// Backend protocol family of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Anthropic Messages API
    Anthropic,
    /// Any `/chat/completions` endpoint (OpenRouter, DeepSeek, ...)
    OpenaiCompat,
    /// Ollama `/api/chat`
    Ollama,
    /// Local bridge process speaking typed NDJSON
    Bridge,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenaiCompat => "openai_compat",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Bridge => "bridge",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Base URL; each kind has its own default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Inline credential. Prefer `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Name of the environment variable holding the credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// History ceiling in estimated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_budget: Option<usize>,

    /// Provider id tried when this one fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Ollama only: how long the model stays loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,

    /// OpenAI-compatible routers only: upstream preference order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_order: Vec<String>,

    /// Replaces the global system prompt for this provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_headers: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    1024
}

impl ProviderConfig {
    /// A provider of the given kind with every optional field unset.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_url: None,
            api_key: None,
            api_key_env: None,
            model: None,
            context_budget: None,
            fallback: None,
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            keep_alive: None,
            provider_order: Vec::new(),
            system_prompt: None,
            extra_headers: BTreeMap::new(),
        }
    }

    /// The credential, from the inline value or the named environment
    /// variable. Blank values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        let inline = self.api_key.clone().filter(|k| !k.trim().is_empty());
        inline.or_else(|| {
            self.api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .filter(|k| !k.trim().is_empty())
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("api_key_env", &self.api_key_env)
            .field("model", &self.model)
            .field("context_budget", &self.context_budget)
            .field("fallback", &self.fallback)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("system_prompt", &self.system_prompt.is_some())
            .finish()
    }
}

/// A routing profile: messages whose keywords score highest for this agent
/// go to its provider with its prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Provider id or alias
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Matched case-insensitively as substrings of the message
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Hard cap on turns held per (provider, channel)
    #[serde(default = "default_history_cap")]
    pub cap: usize,

    /// Turns kept when the cap is exceeded
    #[serde(default = "default_history_keep")]
    pub keep: usize,

    /// Turns loaded from the store when a session starts
    #[serde(default = "default_history_load_limit")]
    pub load_limit: usize,
}

fn default_history_cap() -> usize {
    100
}
fn default_history_keep() -> usize {
    60
}
fn default_history_load_limit() -> usize {
    40
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cap: default_history_cap(),
            keep: default_history_keep(),
            load_limit: default_history_load_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Whether new sessions start with enrichment on
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_knowledge_ttl")]
    pub knowledge_ttl_secs: u64,

    #[serde(default = "default_digest_ttl")]
    pub digest_ttl_secs: u64,

    /// Lifetime of a recall block built for one set of keywords
    #[serde(default = "default_recall_ttl")]
    pub recall_ttl_secs: u64,

    /// Entities need at least this many mentions before recall uses them
    #[serde(default = "default_recall_min_frequency")]
    pub recall_min_frequency: i64,

    #[serde(default = "default_recall_max_keywords")]
    pub recall_max_keywords: usize,

    #[serde(default = "default_recall_hits_per_keyword")]
    pub recall_hits_per_keyword: usize,

    #[serde(default = "default_recall_max_snippets")]
    pub recall_max_snippets: usize,

    #[serde(default = "default_recall_max_tokens")]
    pub recall_max_tokens: usize,

    /// Providers with a smaller context ceiling skip episodic recall
    #[serde(default = "default_recall_min_budget")]
    pub recall_min_budget: usize,

    /// Static context appended to every system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friends_file: Option<PathBuf>,
}

fn default_knowledge_ttl() -> u64 {
    60
}
fn default_digest_ttl() -> u64 {
    3600
}
fn default_recall_ttl() -> u64 {
    300
}
fn default_recall_min_frequency() -> i64 {
    5
}
fn default_recall_max_keywords() -> usize {
    3
}
fn default_recall_hits_per_keyword() -> usize {
    5
}
fn default_recall_max_snippets() -> usize {
    2
}
fn default_recall_max_tokens() -> usize {
    300
}
fn default_recall_min_budget() -> usize {
    DEFAULT_CONTEXT_BUDGET
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            knowledge_ttl_secs: default_knowledge_ttl(),
            digest_ttl_secs: default_digest_ttl(),
            recall_ttl_secs: default_recall_ttl(),
            recall_min_frequency: default_recall_min_frequency(),
            recall_max_keywords: default_recall_max_keywords(),
            recall_hits_per_keyword: default_recall_hits_per_keyword(),
            recall_max_snippets: default_recall_max_snippets(),
            recall_max_tokens: default_recall_max_tokens(),
            recall_min_budget: default_recall_min_budget(),
            friends_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file; defaults to `~/.switchboard/switchboard.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// The sqlx connection URL for the configured database file.
    pub fn database_url(&self) -> String {
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("switchboard.db"));
        format!("sqlite://{}", path.display())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8090
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_chat_id: Option<String>,
}

impl std::fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyConfig")
            .field("telegram_bot_token", &redact(&self.telegram_bot_token))
            .field("telegram_chat_id", &self.telegram_chat_id)
            .finish()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl AppConfig {
    /// Load configuration from the default location with env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, with env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with(path, std::env::var("SWITCHBOARD_PROVIDER").ok())
    }

    fn load_with(path: &Path, provider_override: Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;

        // Environment variable overrides (highest priority)
        if let Some(provider) = provider_override.filter(|p| !p.trim().is_empty()) {
            if config.providers.contains_key(&provider) {
                config.default_provider = provider;
            } else {
                tracing::warn!(provider = %provider, "SWITCHBOARD_PROVIDER names an unknown provider, ignoring");
            }
        }

        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchboard")
    }

    /// The config file: `SWITCHBOARD_CONFIG` if set, else `config.toml` in
    /// the config directory.
    pub fn config_path() -> PathBuf {
        std::env::var("SWITCHBOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_dir().join("config.toml"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.providers.contains_key(&self.default_provider) {
            return Err(ConfigError::ValidationError(format!(
                "default_provider '{}' is not a configured provider",
                self.default_provider
            )));
        }

        if self.history.keep == 0 || self.history.keep > self.history.cap {
            return Err(ConfigError::ValidationError(
                "history.keep must be between 1 and history.cap".into(),
            ));
        }

        for (id, provider) in &self.providers {
            if provider.context_budget == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "providers.{id}.context_budget must be > 0"
                )));
            }
            if let Some(fallback) = &provider.fallback {
                if fallback == id {
                    return Err(ConfigError::ValidationError(format!(
                        "providers.{id}.fallback cannot point at itself"
                    )));
                }
                if !self.providers.contains_key(fallback) {
                    return Err(ConfigError::ValidationError(format!(
                        "providers.{id}.fallback '{fallback}' is not a configured provider"
                    )));
                }
            }
        }

        for (alias, target) in &self.aliases {
            if !self.providers.contains_key(target) {
                tracing::warn!(alias = %alias, target = %target, "Alias points at an unknown provider and will be ignored");
            }
        }

        for (id, agent) in &self.agents {
            let known = self.providers.contains_key(&agent.provider)
                || self
                    .aliases
                    .get(&agent.provider)
                    .is_some_and(|target| self.providers.contains_key(target));
            if !known {
                return Err(ConfigError::ValidationError(format!(
                    "agents.{id}.provider '{}' is not a configured provider",
                    agent.provider
                )));
            }
        }

        Ok(())
    }

    /// Map a client-supplied provider name to a configured provider id.
    ///
    /// Exact ids win over aliases; anything unknown maps to the default.
    pub fn resolve_provider(&self, requested: &str) -> String {
        let requested = requested.trim();
        if self.providers.contains_key(requested) {
            return requested.to_string();
        }
        if let Some(target) = self.aliases.get(requested) {
            if self.providers.contains_key(target) {
                return target.clone();
            }
        }
        self.default_provider.clone()
    }

    /// Base system prompt for a provider: its own, else the global one.
    pub fn system_prompt_for(&self, provider_id: &str) -> &str {
        self.providers
            .get(provider_id)
            .and_then(|p| p.system_prompt.as_deref())
            .filter(|prompt| !prompt.trim().is_empty())
            .unwrap_or(&self.system_prompt)
    }

    /// Pick the agent whose keywords best match `message`.
    ///
    /// Each keyword found in the lowercased message scores one point. The
    /// highest score wins and ties go to the first agent by id. Returns
    /// `None` when nothing matches or the message is too short to judge.
    pub fn detect_agent(&self, message: &str) -> Option<&str> {
        let message = message.trim();
        if message.chars().count() < AGENT_MIN_MESSAGE_CHARS {
            return None;
        }
        let text = message.to_lowercase();

        let mut best: Option<(&str, usize)> = None;
        for (id, agent) in &self.agents {
            let score = agent
                .keywords
                .iter()
                .filter(|kw| !kw.is_empty() && text.contains(&kw.to_lowercase()))
                .count();
            if score > 0 && best.is_none_or(|(_, top)| score > top) {
                best = Some((id.as_str(), score));
            }
        }
        best.map(|(id, _)| id)
    }

    /// History ceiling for a provider, in estimated tokens.
    pub fn context_budget(&self, provider_id: &str) -> usize {
        self.providers
            .get(provider_id)
            .and_then(|p| p.context_budget)
            .unwrap_or(DEFAULT_CONTEXT_BUDGET)
    }

    /// The configured fallback of a provider, if any.
    pub fn fallback_for(&self, provider_id: &str) -> Option<&str> {
        self.providers
            .get(provider_id)
            .and_then(|p| p.fallback.as_deref())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}
