//! Telegram Bot API notifier.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchboard_core::error::NotifyError;
use switchboard_core::notify::Notifier;
use tracing::debug;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Bot API limit on message length, in characters.
const MAX_MESSAGE_CHARS: usize = 4096;

/// Sends each notification as a message to one chat.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: TELEGRAM_API_BASE.into(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        }
    }

    /// Point at a different Bot API host (self-hosted server or tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn send_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("api_base", &self.api_base)
            .field("bot_token", &"[REDACTED]")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let text = match text.char_indices().nth(MAX_MESSAGE_CHARS) {
            Some((cut, _)) => &text[..cut],
            None => text,
        };
        let response = self
            .client
            .post(self.send_url())
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            // reqwest errors embed the URL, which carries the token
            .map_err(|e| NotifyError::DeliveryFailed(e.without_url().to_string()))?;

        let status = response.status();
        let body: Option<ApiResponse> = response.json().await.ok();
        match body {
            Some(ApiResponse { ok: true, .. }) if status.is_success() => {
                debug!(chat_id = %self.chat_id, "Telegram notification delivered");
                Ok(())
            }
            Some(ApiResponse { description, .. }) => Err(NotifyError::DeliveryFailed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                description.unwrap_or_default()
            ))),
            None => Err(NotifyError::DeliveryFailed(format!(
                "HTTP {}: unreadable response",
                status.as_u16()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Json, Path};
    use axum::routing::post;
    use axum::{Router, http::StatusCode};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    async fn spawn_bot_api(received: Arc<Mutex<Vec<(String, Value)>>>) -> String {
        let app = Router::new().route(
            "/{bot}/sendMessage",
            post(move |Path(bot): Path<String>, Json(body): Json<Value>| {
                let received = Arc::clone(&received);
                async move {
                    received.lock().unwrap().push((bot.clone(), body));
                    if bot == "botgood" {
                        (StatusCode::OK, Json(json!({"ok": true, "result": {}})))
                    } else {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"ok": false, "description": "Unauthorized"})),
                        )
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn posts_chat_id_and_text() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_bot_api(Arc::clone(&received)).await;
        let notifier = TelegramNotifier::new("good", "42").with_api_base(base);

        notifier.notify("switched to openrouter").await.unwrap();

        let calls = received.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "botgood");
        assert_eq!(calls[0].1, json!({"chat_id": "42", "text": "switched to openrouter"}));
    }

    #[tokio::test]
    async fn api_rejection_is_delivery_failure() {
        let base = spawn_bot_api(Arc::new(Mutex::new(Vec::new()))).await;
        let notifier = TelegramNotifier::new("bad", "42").with_api_base(base);

        let err = notifier.notify("hello").await.unwrap_err();
        assert!(err.to_string().contains("HTTP 401: Unauthorized"), "{err}");
    }

    #[tokio::test]
    async fn long_text_is_clipped() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let base = spawn_bot_api(Arc::clone(&received)).await;
        let notifier = TelegramNotifier::new("good", "42").with_api_base(base);

        notifier.notify(&"é".repeat(5000)).await.unwrap();

        let calls = received.lock().unwrap();
        let sent = calls[0].1["text"].as_str().unwrap();
        assert_eq!(sent.chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn debug_redacts_token() {
        let notifier = TelegramNotifier::new("123:secret", "42");
        let debug = format!("{notifier:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
