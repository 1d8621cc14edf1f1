//! End-to-end tests for Switchboard.
//!
//! These drive the orchestrator through the real HTTP worker against local
//! axum servers that speak the backend wire formats, with SQLite or
//! in-memory storage underneath.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{Value, json};

use switchboard_chat::{ChatOrchestrator, ChatSession};
use switchboard_config::{AppConfig, ProviderConfig, ProviderKind};
use switchboard_core::message::{ChatTurn, Role};
use switchboard_core::notify::Notifier;
use switchboard_core::store::{ChatStore, KnowledgeStore};
use switchboard_memory::{InMemoryStore, MemoryEnricher, SqliteStore};
use switchboard_notify::LogNotifier;
use switchboard_providers::build_from_config;

// ── Fake backends ────────────────────────────────────────────────────────

type Requests = Arc<Mutex<Vec<Value>>>;

async fn spawn_server(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// An Ollama-style `/api/chat` backend that answers every request with
/// `reply`, split over several NDJSON lines, and records request bodies.
async fn spawn_ollama(reply: &'static str) -> (SocketAddr, Requests) {
    let requests: Requests = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&requests);
    let app = Router::new().route(
        "/api/chat",
        post(move |Json(body): Json<Value>| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(body);
                let mut lines = String::new();
                for word in reply.split_inclusive(' ') {
                    lines.push_str(&json!({"message": {"content": word}, "done": false}).to_string());
                    lines.push('\n');
                }
                lines.push_str(&json!({"done": true, "prompt_eval_count": 21, "eval_count": 7}).to_string());
                lines.push('\n');
                Response::builder()
                    .header("content-type", "application/x-ndjson")
                    .body(Body::from(lines))
                    .unwrap()
            }
        }),
    );
    (spawn_server(app).await, requests)
}

/// An Anthropic-style backend that always fails with a 529.
async fn spawn_overloaded_anthropic() -> SocketAddr {
    let app = Router::new().route(
        "/v1/messages",
        post(|| async {
            (
                StatusCode::from_u16(529).unwrap(),
                r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            )
                .into_response()
        }),
    );
    spawn_server(app).await
}

// ── Wiring ───────────────────────────────────────────────────────────────

fn ollama_provider(addr: SocketAddr, fallback: Option<&str>) -> ProviderConfig {
    ProviderConfig {
        api_url: Some(format!("http://{addr}")),
        model: Some("gemma3:1b".into()),
        context_budget: Some(3000),
        fallback: fallback.map(str::to_string),
        timeout_secs: 5,
        ..ProviderConfig::new(ProviderKind::Ollama)
    }
}

fn config_with(providers: Vec<(&str, ProviderConfig)>, default_provider: &str) -> AppConfig {
    let mut config = AppConfig {
        default_provider: default_provider.into(),
        providers: providers
            .into_iter()
            .map(|(id, p)| (id.to_string(), p))
            .collect::<BTreeMap<_, _>>(),
        aliases: [("local".to_string(), "lan".to_string())].into_iter().collect(),
        ..AppConfig::default()
    };
    config.memory.knowledge_ttl_secs = 0;
    config
}

fn orchestrator_over<S>(config: AppConfig, store: Arc<S>) -> ChatOrchestrator
where
    S: ChatStore + KnowledgeStore + 'static,
{
    let config = Arc::new(config);
    let enricher = Arc::new(MemoryEnricher::new(&config, store.clone(), store.clone()));
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    ChatOrchestrator::new(
        Arc::clone(&config),
        build_from_config(&config),
        store.clone(),
        store,
        enricher,
        notifier,
    )
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn streams_reply_from_ndjson_backend() {
    let (addr, requests) = spawn_ollama("Ciao! How can I help?").await;
    let config = config_with(vec![("lan", ollama_provider(addr, None))], "lan");
    let orchestrator = orchestrator_over(config, Arc::new(InMemoryStore::new()));
    let mut session = orchestrator.new_session("dashboard");
    let mut chunks = Vec::new();

    let outcome = orchestrator
        .execute(&mut session, "local", "hello", &mut chunks)
        .await;

    assert!(outcome.succeeded);
    assert_eq!(outcome.provider, "lan");
    assert_eq!(outcome.reply, "Ciao! How can I help?");
    assert_eq!(chunks.len(), 5);
    assert_eq!(outcome.counts.input_tokens, 21);
    assert_eq!(outcome.counts.output_tokens, 7);

    let body = requests.lock().unwrap()[0].clone();
    assert_eq!(body["model"], "gemma3:1b");
    assert_eq!(body["stream"], true);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1], json!({"role": "user", "content": "hello"}));
}

#[tokio::test]
async fn history_round_trips_through_sqlite() {
    let (addr, _) = spawn_ollama("Sure thing").await;
    let config = config_with(vec![("lan", ollama_provider(addr, None))], "lan");
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let orchestrator = orchestrator_over(config, Arc::clone(&store));

    let mut session = orchestrator.new_session("dashboard");
    orchestrator
        .execute(&mut session, "lan", "remind me tomorrow", &mut Vec::new())
        .await;

    // A new connection reloads the pair from storage.
    let mut reloaded = ChatSession::new("dashboard", true, orchestrator.config().history.clone());
    let turns = reloaded.history("lan", store.as_ref()).await.turns().to_vec();
    assert_eq!(
        turns,
        vec![
            ChatTurn::user("remind me tomorrow"),
            ChatTurn::assistant("Sure thing"),
        ]
    );

    let usage = store.recent_usage(5).await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].provider, "lan");
    assert_eq!(usage[0].input_tokens, 21);
}

#[tokio::test]
async fn http_failure_fails_over_to_lan_backend() {
    let cloud = spawn_overloaded_anthropic().await;
    let (lan, _) = spawn_ollama("Answer from the LAN").await;
    let config = config_with(
        vec![
            (
                "cloud",
                ProviderConfig {
                    api_url: Some(format!("http://{cloud}")),
                    api_key: Some("sk-test".into()),
                    model: Some("claude-haiku-4-5".into()),
                    fallback: Some("lan".into()),
                    timeout_secs: 5,
                    ..ProviderConfig::new(ProviderKind::Anthropic)
                },
            ),
            ("lan", ollama_provider(lan, None)),
        ],
        "cloud",
    );
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let orchestrator = orchestrator_over(config, Arc::clone(&store));
    let mut session = orchestrator.new_session("dashboard");
    let mut chunks = Vec::new();

    let outcome = orchestrator
        .execute(&mut session, "cloud", "are you there?", &mut chunks)
        .await;

    assert!(outcome.succeeded);
    assert_eq!(outcome.provider, "lan");
    assert_eq!(outcome.reply, "Answer from the LAN");
    assert_eq!(chunks[0], "\n[failover → lan]\n");

    let audits = store.audit_records(Some("failover"), 10).await.unwrap();
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].resource, "cloud → lan");
    assert!(audits[0].details.starts_with("HTTP 529"), "{}", audits[0].details);
}

#[tokio::test]
async fn unreachable_chain_replies_with_tagged_error() {
    // Bind and drop to get a port nothing listens on.
    let dead = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let config = config_with(vec![("lan", ollama_provider(dead, None))], "lan");
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = orchestrator_over(config, Arc::clone(&store));
    let mut session = orchestrator.new_session("dashboard");

    let outcome = orchestrator
        .execute(&mut session, "lan", "hello?", &mut Vec::new())
        .await;

    assert!(!outcome.succeeded);
    assert!(outcome.reply.starts_with("(error lan: "), "{}", outcome.reply);
    assert!(!outcome.reply.is_empty());

    let stored = store.load_history("lan", "dashboard", 10).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].role, Role::Assistant);
    assert_eq!(stored[1].content, outcome.reply);
}

#[tokio::test]
async fn learned_entities_reach_the_next_system_prompt() {
    let (addr, requests) = spawn_ollama("Python is a fine choice").await;
    let config = config_with(vec![("lan", ollama_provider(addr, None))], "lan");
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = orchestrator_over(config, Arc::clone(&store));
    let mut session = orchestrator.new_session("dashboard");

    orchestrator
        .execute(
            &mut session,
            "lan",
            "I spoke with Maria Rossi about Python today",
            &mut Vec::new(),
        )
        .await;
    orchestrator.finish_background().await;

    let maria = store.find_entity("Maria Rossi").await.unwrap().unwrap();
    assert_eq!(maria.frequency, 1);
    assert_eq!(store.relations_for(maria.id).await.unwrap().len(), 1);

    orchestrator
        .execute(&mut session, "lan", "what next?", &mut Vec::new())
        .await;

    let second = requests.lock().unwrap()[1].clone();
    let system = second["messages"][0]["content"].as_str().unwrap().to_string();
    assert!(system.contains("## What you remember about the user"), "{system}");
    assert!(system.contains("- Tech interests: python"), "{system}");
    assert!(system.contains("- People mentioned: Maria Rossi"), "{system}");
}

#[tokio::test]
async fn memory_toggle_keeps_prompt_plain() {
    let (addr, requests) = spawn_ollama("ok").await;
    let config = config_with(vec![("lan", ollama_provider(addr, None))], "lan");
    let store = Arc::new(InMemoryStore::new());
    store
        .upsert_entity(switchboard_core::EntityKind::Tech, "docker")
        .await
        .unwrap();
    let orchestrator = orchestrator_over(config, store);
    let mut session = orchestrator.new_session("dashboard");
    session.toggle_memory();

    orchestrator
        .execute(&mut session, "lan", "hi", &mut Vec::new())
        .await;

    let body = requests.lock().unwrap()[0].clone();
    let system = body["messages"][0]["content"].as_str().unwrap();
    assert!(system.starts_with(&AppConfig::default().system_prompt));
    assert!(system.contains("Today is"));
    assert!(!system.contains("docker"));
}
