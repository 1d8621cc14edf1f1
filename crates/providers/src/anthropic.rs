//! Anthropic Messages API request builder.
//!
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Streaming via SSE typed events

use std::time::Duration;

use serde::Serialize;
use switchboard_config::ProviderConfig;
use switchboard_core::message::ChatTurn;

use crate::descriptor::{ProviderDescriptor, Target, WireFormat, pick_model};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Resolved settings of one Anthropic provider.
#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    target: Result<Target, String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: u32,
    timeout: Duration,
}

impl AnthropicBackend {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            target: Target::resolve(config.api_url.as_deref(), DEFAULT_BASE_URL),
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
        }
    }

    pub fn default_model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn describe(
        &self,
        id: &str,
        model: Option<&str>,
        system_prompt: &str,
        history: &[ChatTurn],
    ) -> ProviderDescriptor {
        let invalid = |reason: String| {
            ProviderDescriptor::invalid(id, WireFormat::SseChatEvents, reason)
        };

        let Some(api_key) = self.api_key.as_deref() else {
            return invalid(format!("no API key configured for {id}"));
        };
        let Some(model) = pick_model(model, self.model.as_deref()) else {
            return invalid(format!("no model configured for {id}"));
        };
        let target = match &self.target {
            Ok(target) => target,
            Err(reason) => return invalid(reason.clone()),
        };

        let body = MessagesRequest {
            model: &model,
            max_tokens: self.max_tokens,
            system: system_prompt,
            messages: history
                .iter()
                .map(|turn| ApiMessage {
                    role: turn.role.as_str(),
                    content: &turn.content,
                })
                .collect(),
            stream: true,
        };
        let payload = match serde_json::to_string(&body) {
            Ok(payload) => payload,
            Err(e) => return invalid(format!("failed to encode request for {id}: {e}")),
        };

        ProviderDescriptor::new(
            id,
            model.clone(),
            target.endpoint.clone(),
            target.path("/v1/messages"),
            vec![
                ("content-type".into(), "application/json".into()),
                ("accept".into(), "text/event-stream".into()),
                ("anthropic-version".into(), ANTHROPIC_VERSION.into()),
                ("x-api-key".into(), api_key.to_string()),
            ],
            payload,
            WireFormat::SseChatEvents,
            self.timeout,
        )
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_config::ProviderKind;

    fn config() -> ProviderConfig {
        ProviderConfig {
            api_key: Some("sk-ant-test".into()),
            model: Some("claude-haiku-4-5".into()),
            ..ProviderConfig::new(ProviderKind::Anthropic)
        }
    }

    #[test]
    fn builds_messages_request() {
        let backend = AnthropicBackend::from_config(&config());
        let history = vec![ChatTurn::user("Hello"), ChatTurn::assistant("Hi!"), ChatTurn::user("Rust?")];
        let d = backend.describe("anthropic", None, "Be brief", &history);

        assert!(d.is_valid());
        assert_eq!(d.endpoint.host, "api.anthropic.com");
        assert_eq!(d.endpoint.port, 443);
        assert!(d.endpoint.tls);
        assert_eq!(d.path, "/v1/messages");
        assert_eq!(d.wire_format, WireFormat::SseChatEvents);
        assert!(d.headers.contains(&("x-api-key".into(), "sk-ant-test".into())));
        assert!(d.headers.contains(&("anthropic-version".into(), "2023-06-01".into())));

        let body: serde_json::Value = serde_json::from_str(&d.payload).unwrap();
        assert_eq!(body["model"], "claude-haiku-4-5");
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 1024);
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][1]["role"], "assistant");
    }

    #[test]
    fn missing_key_is_invalid() {
        let cfg = ProviderConfig {
            api_key: None,
            api_key_env: None,
            ..config()
        };
        let d = AnthropicBackend::from_config(&cfg).describe("anthropic", None, "", &[]);
        assert!(!d.is_valid());
        assert!(d.invalid_reason().unwrap().contains("API key"));
    }

    #[test]
    fn missing_model_is_invalid() {
        let cfg = ProviderConfig {
            model: None,
            ..config()
        };
        let d = AnthropicBackend::from_config(&cfg).describe("anthropic", None, "", &[]);
        assert!(d.invalid_reason().unwrap().contains("model"));
    }

    #[test]
    fn request_model_overrides_default() {
        let d = AnthropicBackend::from_config(&config()).describe(
            "anthropic",
            Some("claude-sonnet-4-5"),
            "",
            &[ChatTurn::user("x")],
        );
        assert_eq!(d.model, "claude-sonnet-4-5");
    }

    #[test]
    fn custom_base_url_is_honoured() {
        let cfg = ProviderConfig {
            api_url: Some("http://127.0.0.1:9000/anthropic".into()),
            ..config()
        };
        let d = AnthropicBackend::from_config(&cfg).describe("anthropic", None, "", &[]);
        assert_eq!(d.url(), "http://127.0.0.1:9000/anthropic/v1/messages");
    }
}
