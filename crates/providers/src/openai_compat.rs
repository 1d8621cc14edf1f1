//! OpenAI-compatible request builder.
//!
//! Works with OpenRouter, DeepSeek, OpenAI and any endpoint exposing
//! `/chat/completions` with SSE streaming. The system prompt travels as the
//! first message.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use switchboard_config::ProviderConfig;
use switchboard_core::message::ChatTurn;

use crate::descriptor::{ProviderDescriptor, Target, WireFormat, pick_model};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Resolved settings of one OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAiCompatBackend {
    target: Result<Target, String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: u32,
    timeout: Duration,
    provider_order: Vec<String>,
    extra_headers: BTreeMap<String, String>,
}

impl OpenAiCompatBackend {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            target: Target::resolve(config.api_url.as_deref(), DEFAULT_BASE_URL),
            api_key: config.resolve_api_key(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
            provider_order: config.provider_order.clone(),
            extra_headers: config.extra_headers.clone(),
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
        let invalid =
            |reason: String| ProviderDescriptor::invalid(id, WireFormat::SseChoices, reason);

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

        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(ApiMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.extend(history.iter().map(|turn| ApiMessage {
            role: turn.role.as_str(),
            content: &turn.content,
        }));

        let body = CompletionRequest {
            model: &model,
            messages,
            max_tokens: self.max_tokens,
            stream: true,
            stream_options: StreamOptions {
                include_usage: true,
            },
            provider: (!self.provider_order.is_empty()).then(|| RoutingPreferences {
                order: &self.provider_order,
            }),
        };
        let payload = match serde_json::to_string(&body) {
            Ok(payload) => payload,
            Err(e) => return invalid(format!("failed to encode request for {id}: {e}")),
        };

        let mut headers = vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("accept".to_string(), "text/event-stream".to_string()),
            ("authorization".to_string(), format!("Bearer {api_key}")),
        ];
        headers.extend(
            self.extra_headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );

        ProviderDescriptor::new(
            id,
            model.clone(),
            target.endpoint.clone(),
            target.path("/chat/completions"),
            headers,
            payload,
            WireFormat::SseChoices,
            self.timeout,
        )
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    max_tokens: u32,
    stream: bool,
    stream_options: StreamOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<RoutingPreferences<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// OpenRouter upstream routing preferences.
#[derive(Debug, Serialize)]
struct RoutingPreferences<'a> {
    order: &'a [String],
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_config::ProviderKind;

    fn config() -> ProviderConfig {
        ProviderConfig {
            api_key: Some("sk-or-test".into()),
            model: Some("deepseek/deepseek-chat".into()),
            ..ProviderConfig::new(ProviderKind::OpenaiCompat)
        }
    }

    #[test]
    fn builds_openrouter_request() {
        let cfg = ProviderConfig {
            provider_order: vec!["ModelRun".into(), "DeepInfra".into()],
            extra_headers: [("X-Title".to_string(), "Switchboard".to_string())]
                .into_iter()
                .collect(),
            ..config()
        };
        let d = OpenAiCompatBackend::from_config(&cfg).describe(
            "openrouter",
            None,
            "You are terse",
            &[ChatTurn::user("ciao")],
        );

        assert!(d.is_valid());
        assert_eq!(d.endpoint.host, "openrouter.ai");
        assert_eq!(d.path, "/api/v1/chat/completions");
        assert_eq!(d.wire_format, WireFormat::SseChoices);
        assert!(d.headers.contains(&("authorization".into(), "Bearer sk-or-test".into())));
        assert!(d.headers.contains(&("X-Title".into(), "Switchboard".into())));

        let body: serde_json::Value = serde_json::from_str(&d.payload).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are terse");
        assert_eq!(body["messages"][1]["content"], "ciao");
        assert_eq!(body["provider"]["order"][1], "DeepInfra");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn routing_preferences_omitted_when_empty() {
        let d = OpenAiCompatBackend::from_config(&config()).describe(
            "openrouter",
            None,
            "",
            &[ChatTurn::user("x")],
        );
        let body: serde_json::Value = serde_json::from_str(&d.payload).unwrap();
        assert!(body.get("provider").is_none());
        // Empty system prompt is not sent as a message
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn missing_key_is_invalid() {
        let cfg = ProviderConfig {
            api_key: None,
            ..config()
        };
        let d = OpenAiCompatBackend::from_config(&cfg).describe("openrouter", None, "", &[]);
        assert!(!d.is_valid());
        assert_eq!(d.invalid_reason(), Some("no API key configured for openrouter"));
    }
}
