//! WebSocket gateway for Switchboard.
//!
//! Routes:
//! - `GET /health` : liveness and the configured providers
//! - `GET /ws`     : chat connection speaking [`ChatCommand`] / [`ChatEvent`]
//!
//! Each WebSocket connection owns one [`ChatSession`]; connections share
//! nothing but the orchestrator and its stores.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Json},
    routing::get,
};
use serde::{Deserialize, Serialize};
use switchboard_chat::{ChatCommand, ChatEvent, ChatOrchestrator, ChatSession, ReplySink};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// Inbound chat text is clipped to this many characters.
pub const MAX_INBOUND_CHARS: usize = 4000;

/// Channel used when a connection does not name one.
pub const DEFAULT_CHANNEL: &str = "dashboard";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<ChatOrchestrator>,
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(orchestrator: Arc<ChatOrchestrator>) -> Router {
    let state = Arc::new(GatewayState { orchestrator });
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Bind to the configured address and serve until the process stops.
pub async fn start(
    orchestrator: Arc<ChatOrchestrator>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let gateway = &orchestrator.config().gateway;
    let port = port_override.unwrap_or(gateway.port);
    let addr = format!("{}:{port}", gateway.host);

    let app = build_router(orchestrator);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    default_provider: String,
    providers: Vec<String>,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let config = state.orchestrator.config();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        default_provider: config.default_provider.clone(),
        providers: config.providers.keys().cloned().collect(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct WsParams {
    #[serde(default)]
    channel: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let channel = params
        .channel
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, channel))
}

async fn handle_ws_connection(mut socket: WebSocket, state: SharedState, channel: String) {
    info!(channel = %channel, "WebSocket connection established");
    let mut session = state.orchestrator.new_session(channel.clone());

    while let Some(msg) = socket.recv().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "WebSocket receive failed");
                break;
            }
        };

        if !handle_command(&state.orchestrator, &mut session, text.as_str(), &mut socket).await {
            break;
        }
    }

    info!(channel = %channel, "WebSocket connection closed");
}

/// Where outbound events go. Returns `false` once the client is gone.
#[async_trait]
pub trait EventSink: Send {
    async fn send_event(&mut self, event: ChatEvent) -> bool;
}

#[async_trait]
impl EventSink for WebSocket {
    async fn send_event(&mut self, event: ChatEvent) -> bool {
        self.send(WsMessage::Text(event.to_json().into())).await.is_ok()
    }
}

#[async_trait]
impl EventSink for Vec<ChatEvent> {
    async fn send_event(&mut self, event: ChatEvent) -> bool {
        self.push(event);
        true
    }
}

/// Relays reply chunks as `chat_chunk` events.
struct ChunkForwarder<'a, E: EventSink> {
    events: &'a mut E,
    connected: bool,
}

#[async_trait]
impl<'a, E: EventSink> ReplySink for ChunkForwarder<'a, E> {
    async fn chunk(&mut self, text: &str) {
        // Once the client is gone the turn still runs to completion so the
        // reply is stored; only delivery stops.
        if self.connected {
            self.connected = self
                .events
                .send_event(ChatEvent::ChatChunk {
                    text: text.to_string(),
                })
                .await;
        }
    }
}

/// Handle one raw client frame. Returns `false` when the client is gone.
pub async fn handle_command<E: EventSink>(
    orchestrator: &ChatOrchestrator,
    session: &mut ChatSession,
    raw: &str,
    events: &mut E,
) -> bool {
    let command = match ChatCommand::parse(raw) {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, "Rejected client command");
            return events
                .send_event(ChatEvent::Error {
                    message: format!("Invalid command: {e}"),
                })
                .await;
        }
    };

    match command {
        ChatCommand::Chat { text, provider } => {
            let text = clip_inbound(&text);
            if text.is_empty() {
                debug!("Ignoring empty chat message");
                return true;
            }
            if !events.send_event(ChatEvent::ChatThinking).await {
                return false;
            }

            let requested = provider.unwrap_or_default();
            let mut forwarder = ChunkForwarder {
                events: &mut *events,
                connected: true,
            };
            let outcome = orchestrator
                .execute(session, &requested, text, &mut forwarder)
                .await;
            if !forwarder.connected {
                return false;
            }
            events
                .send_event(ChatEvent::ChatDone {
                    provider: outcome.provider,
                    agent: outcome.agent,
                })
                .await
        }
        ChatCommand::ClearChat => {
            let removed = session.clear(orchestrator.chats().as_ref()).await;
            info!(channel = %session.channel(), removed, "Chat history cleared");
            events.send_event(ChatEvent::ChatCleared).await
        }
        ChatCommand::ToggleMemory => {
            let enabled = session.toggle_memory();
            info!(channel = %session.channel(), enabled, "Memory toggled");
            events.send_event(ChatEvent::MemoryStatus { enabled }).await
        }
        ChatCommand::DeleteEntity { id } => {
            if id <= 0 {
                return events
                    .send_event(ChatEvent::Error {
                        message: format!("Invalid entity id: {id}"),
                    })
                    .await;
            }
            let success = match orchestrator.forget_entity(id).await {
                Ok(deleted) => deleted,
                Err(e) => {
                    warn!(entity_id = id, error = %e, "Entity delete failed");
                    false
                }
            };
            events.send_event(ChatEvent::EntityDeleted { id, success }).await
        }
    }
}

/// Trim and clip inbound text to [`MAX_INBOUND_CHARS`].
fn clip_inbound(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().nth(MAX_INBOUND_CHARS) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}
