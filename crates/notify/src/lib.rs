//! Operator notification sinks.
//!
//! - **Telegram**: Bot API `sendMessage`
//! - **Log**: a `tracing` event, used when no bot is configured

pub mod logger;
pub mod telegram;

use std::sync::Arc;

use switchboard_config::NotifyConfig;
use switchboard_core::notify::Notifier;

pub use logger::LogNotifier;
pub use telegram::TelegramNotifier;

/// Pick the notifier described by configuration.
///
/// Telegram needs both a bot token and a chat id; anything less falls back
/// to the log notifier.
pub fn from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    let token = config.telegram_bot_token.as_deref().filter(|t| !t.trim().is_empty());
    let chat_id = config.telegram_chat_id.as_deref().filter(|c| !c.trim().is_empty());
    match (token, chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(token, chat_id)),
        _ => Arc::new(LogNotifier),
    }
}
