//! Ollama `/api/chat` request builder.
//!
//! Local and LAN model servers. No credential; the response is
//! newline-delimited JSON.

use std::time::Duration;

use serde::Serialize;
use switchboard_config::ProviderConfig;
use switchboard_core::message::ChatTurn;

use crate::descriptor::{ProviderDescriptor, Target, WireFormat, pick_model};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_KEEP_ALIVE: &str = "60m";

#[derive(Debug, Clone)]
pub struct OllamaBackend {
    target: Result<Target, String>,
    model: Option<String>,
    num_predict: u32,
    keep_alive: String,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            target: Target::resolve(config.api_url.as_deref(), DEFAULT_BASE_URL),
            model: config.model.clone(),
            num_predict: config.max_tokens,
            keep_alive: config
                .keep_alive
                .clone()
                .unwrap_or_else(|| DEFAULT_KEEP_ALIVE.into()),
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
        let invalid =
            |reason: String| ProviderDescriptor::invalid(id, WireFormat::NdjsonMessage, reason);

        let Some(model) = pick_model(model, self.model.as_deref()) else {
            return invalid(format!("no model configured for {id}"));
        };
        let target = match &self.target {
            Ok(target) => target,
            Err(reason) => return invalid(reason.clone()),
        };

        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system_prompt,
            });
        }
        messages.extend(history.iter().map(|turn| ChatMessage {
            role: turn.role.as_str(),
            content: &turn.content,
        }));

        let body = ChatRequest {
            model: &model,
            messages,
            stream: true,
            keep_alive: &self.keep_alive,
            options: ChatOptions {
                num_predict: self.num_predict,
            },
        };
        let payload = match serde_json::to_string(&body) {
            Ok(payload) => payload,
            Err(e) => return invalid(format!("failed to encode request for {id}: {e}")),
        };

        ProviderDescriptor::new(
            id,
            model.clone(),
            target.endpoint.clone(),
            target.path("/api/chat"),
            vec![("content-type".into(), "application/json".into())],
            payload,
            WireFormat::NdjsonMessage,
            self.timeout,
        )
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    keep_alive: &'a str,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_predict: u32,
}
