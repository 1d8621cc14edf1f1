//! WebSocket protocol messages.
//!
//! Clients send [`ChatCommand`]s tagged by `action`; the server answers with
//! [`ChatEvent`]s tagged by `type`:
//! - `chat_thinking`  : a turn was accepted
//! - `chat_chunk`     : partial reply text, in backend order
//! - `chat_done`      : the turn finished, naming the provider that answered
//!                      (and the agent, when `auto` routing picked one)
//! - `chat_cleared`   : histories were erased
//! - `memory_status`  : enrichment toggle state
//! - `entity_deleted` : outcome of a `delete_entity` command
//! - `error`          : the command could not be handled

use serde::{Deserialize, Serialize};

/// Events sent to a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    ChatThinking,

    ChatChunk { text: String },

    ChatDone {
        provider: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent: Option<String>,
    },

    ChatCleared,

    MemoryStatus { enabled: bool },

    EntityDeleted { id: i64, success: bool },

    Error { message: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ChatThinking => "chat_thinking",
            Self::ChatChunk { .. } => "chat_chunk",
            Self::ChatDone { .. } => "chat_done",
            Self::ChatCleared => "chat_cleared",
            Self::MemoryStatus { .. } => "memory_status",
            Self::EntityDeleted { .. } => "entity_deleted",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> String {
        // A tagged enum of strings and bools always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    }
}

/// Commands received from a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChatCommand {
    Chat {
        #[serde(default)]
        text: String,
        #[serde(default)]
        provider: Option<String>,
    },

    ClearChat,

    ToggleMemory,

    DeleteEntity { id: i64 },
}

impl ChatCommand {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
