//! Local bridge request builder.
//!
//! The bridge is a companion process that runs its own agent and keeps its
//! own conversation state, so it receives only the latest user turn plus
//! the system prompt. It authenticates with a shared token in the body and
//! streams typed NDJSON (`chunk` / `done` / `error`).

use std::time::Duration;

use serde::Serialize;
use switchboard_config::ProviderConfig;
use switchboard_core::message::{ChatTurn, Role};

use crate::descriptor::{ProviderDescriptor, Target, WireFormat, pick_model};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8095";
const BRIDGE_MODEL: &str = "bridge";

#[derive(Debug, Clone)]
pub struct BridgeBackend {
    target: Result<Target, String>,
    token: Option<String>,
    model: Option<String>,
    timeout: Duration,
}

impl BridgeBackend {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            target: Target::resolve(config.api_url.as_deref(), DEFAULT_BASE_URL),
            token: config.resolve_api_key(),
            model: config.model.clone(),
            timeout: config.timeout(),
        }
    }

    pub fn default_model(&self) -> Option<&str> {
        Some(self.model.as_deref().unwrap_or(BRIDGE_MODEL))
    }

    pub fn describe(
        &self,
        id: &str,
        model: Option<&str>,
        system_prompt: &str,
        history: &[ChatTurn],
    ) -> ProviderDescriptor {
        let invalid =
            |reason: String| ProviderDescriptor::invalid(id, WireFormat::NdjsonTyped, reason);

        let Some(token) = self.token.as_deref() else {
            return invalid(format!("no bridge token configured for {id}"));
        };
        let Some(prompt) = history
            .iter()
            .rev()
            .find(|turn| turn.role == Role::User)
            .map(|turn| turn.content.as_str())
        else {
            return invalid(format!("no user message to send to {id}"));
        };
        let target = match &self.target {
            Ok(target) => target,
            Err(reason) => return invalid(reason.clone()),
        };
        let model = pick_model(model, self.model.as_deref()).unwrap_or_else(|| BRIDGE_MODEL.into());

        let body = BridgeRequest {
            token,
            prompt,
            system_prompt,
        };
        let payload = match serde_json::to_string(&body) {
            Ok(payload) => payload,
            Err(e) => return invalid(format!("failed to encode request for {id}: {e}")),
        };

        ProviderDescriptor::new(
            id,
            model,
            target.endpoint.clone(),
            target.path("/brain"),
            vec![("content-type".into(), "application/json".into())],
            payload,
            WireFormat::NdjsonTyped,
            self.timeout,
        )
    }
}

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    token: &'a str,
    prompt: &'a str,
    system_prompt: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_config::ProviderKind;

    fn config() -> ProviderConfig {
        ProviderConfig {
            api_key: Some("bridge-token".into()),
            ..ProviderConfig::new(ProviderKind::Bridge)
        }
    }

    #[test]
    fn sends_only_latest_user_turn() {
        let history = vec![
            ChatTurn::user("first"),
            ChatTurn::assistant("reply"),
            ChatTurn::user("second"),
        ];
        let d = BridgeBackend::from_config(&config()).describe("brain", None, "sys", &history);

        assert!(d.is_valid());
        assert_eq!(d.url(), "http://127.0.0.1:8095/brain");
        assert_eq!(d.wire_format, WireFormat::NdjsonTyped);
        assert_eq!(d.model, "bridge");

        let body: serde_json::Value = serde_json::from_str(&d.payload).unwrap();
        assert_eq!(body["prompt"], "second");
        assert_eq!(body["token"], "bridge-token");
        assert_eq!(body["system_prompt"], "sys");
    }

    #[test]
    fn missing_token_is_invalid() {
        let d = BridgeBackend::from_config(&ProviderConfig::new(ProviderKind::Bridge))
            .describe("brain", None, "", &[ChatTurn::user("x")]);
        assert!(d.invalid_reason().unwrap().contains("token"));
    }

    #[test]
    fn empty_history_is_invalid() {
        let d = BridgeBackend::from_config(&config()).describe("brain", None, "", &[]);
        assert!(!d.is_valid());
    }
}
