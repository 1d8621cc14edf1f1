//! Streaming worker: one HTTP attempt, parsed into [`StreamEvent`]s.
//!
//! Each call to [`run_worker`] spawns two tasks. The attempt task opens the
//! connection, checks the status and feeds every read to the parser selected
//! by the descriptor's wire format. The supervising task awaits it and then
//! always emits the closing `Meta` and `End`, whether the attempt returned,
//! failed or panicked.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::StreamExt;
use switchboard_core::error::ProviderError;
use switchboard_core::stream::{StreamEvent, TokenCounts};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::descriptor::ProviderDescriptor;
use crate::parser::parser_for;

/// Capacity of the per-attempt event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Error bodies are clipped to this many characters.
const ERROR_BODY_LIMIT: usize = 200;

/// Opens a stream of events for one attempt.
///
/// The orchestrator only sees this trait, so tests can script backends
/// without a network.
pub trait StreamTransport: Send + Sync {
    fn open(&self, descriptor: ProviderDescriptor) -> mpsc::Receiver<StreamEvent>;
}

/// The real transport: HTTP via [`run_worker`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

impl StreamTransport for HttpTransport {
    fn open(&self, descriptor: ProviderDescriptor) -> mpsc::Receiver<StreamEvent> {
        run_worker(descriptor)
    }
}

/// Run one attempt against the backend described by `descriptor`.
///
/// The returned receiver yields chunks in wire order, any errors, then one
/// `Meta` with the counts observed so far and a final `End`.
pub fn run_worker(descriptor: ProviderDescriptor) -> mpsc::Receiver<StreamEvent> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let observed = Arc::new(Mutex::new(TokenCounts::default()));
    let provider = descriptor.id.clone();
    let attempt = run_attempt(descriptor, tx.clone(), Arc::clone(&observed));
    supervise(provider, attempt, tx, observed);
    rx
}

/// Spawn `attempt` and guarantee the closing events once it is over.
fn supervise<F>(
    provider: String,
    attempt: F,
    tx: mpsc::Sender<StreamEvent>,
    observed: Arc<Mutex<TokenCounts>>,
) where
    F: Future<Output = Result<(), ProviderError>> + Send + 'static,
{
    tokio::spawn(async move {
        let failure = match tokio::spawn(attempt).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(format!("worker task failed: {e}")),
        };

        if let Some(message) = failure {
            warn!(provider = %provider, error = %message, "Stream attempt failed");
            let _ = tx.send(StreamEvent::Error(message)).await;
        }

        let counts = *observed.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = tx.send(StreamEvent::Meta(counts)).await;
        let _ = tx.send(StreamEvent::End).await;
    });
}

async fn run_attempt(
    descriptor: ProviderDescriptor,
    tx: mpsc::Sender<StreamEvent>,
    observed: Arc<Mutex<TokenCounts>>,
) -> Result<(), ProviderError> {
    if let Some(reason) = descriptor.invalid_reason() {
        return Err(ProviderError::ConfigInvalid(reason.to_string()));
    }

    let timeout = descriptor.timeout;
    let client = reqwest::Client::builder()
        .connect_timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Transport(e.to_string()))?;

    let url = descriptor.url();
    let mut request = client.post(&url);
    for (name, value) in &descriptor.headers {
        request = request.header(name.as_str(), value.as_str());
    }

    debug!(
        provider = %descriptor.id,
        model = %descriptor.model,
        url = %url,
        "Sending streaming request"
    );
    let started = Instant::now();

    let response = tokio::time::timeout(timeout, request.body(descriptor.payload.clone()).send())
        .await
        .map_err(|_| {
            ProviderError::Transport(format!("no response within {}s", timeout.as_secs()))
        })?
        .map_err(|e| ProviderError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = tokio::time::timeout(timeout, response.text())
            .await
            .ok()
            .and_then(|body| body.ok())
            .unwrap_or_default();
        return Err(ProviderError::Protocol {
            status: status.as_u16(),
            message: truncate_chars(body.trim(), ERROR_BODY_LIMIT),
        });
    }

    debug!(
        provider = %descriptor.id,
        status = status.as_u16(),
        latency_ms = started.elapsed().as_millis() as u64,
        "Stream opened"
    );

    let mut parser = parser_for(descriptor.wire_format);
    let mut body = response.bytes_stream();

    loop {
        let next = tokio::time::timeout(timeout, body.next())
            .await
            .map_err(|_| {
                ProviderError::Transport(format!("read timed out after {}s", timeout.as_secs()))
            })?;

        match next {
            Some(Ok(bytes)) => {
                let open = forward(parser.feed(&bytes), &tx, &observed).await;
                if !open || parser.is_finished() {
                    return Ok(());
                }
            }
            Some(Err(e)) => return Err(ProviderError::Transport(e.to_string())),
            None => {
                forward(parser.finish(), &tx, &observed).await;
                return Ok(());
            }
        }
    }
}

/// Relay parser output. `End` is held back for the supervisor and `Meta` is
/// folded into the observed counts. Returns `false` once the receiver is gone.
async fn forward(
    events: Vec<StreamEvent>,
    tx: &mpsc::Sender<StreamEvent>,
    observed: &Mutex<TokenCounts>,
) -> bool {
    for event in events {
        match event {
            StreamEvent::End => break,
            StreamEvent::Meta(counts) => {
                observed
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .merge(counts);
            }
            other => {
                if tx.send(other).await.is_err() {
                    return false;
                }
            }
        }
    }
    true
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::WireFormat;

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn invalid_descriptor_never_connects() {
        let descriptor =
            ProviderDescriptor::invalid("anthropic", WireFormat::SseChatEvents, "no API key configured for anthropic");
        let events = collect(run_worker(descriptor)).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Error("no API key configured for anthropic".into()),
                StreamEvent::Meta(TokenCounts::default()),
                StreamEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn panic_in_attempt_still_closes_stream() {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let observed = Arc::new(Mutex::new(TokenCounts::new(12, 3)));
        let sender = tx.clone();
        supervise(
            "ollama".into(),
            async move {
                sender.send(StreamEvent::Chunk("partial".into())).await.ok();
                panic!("parser exploded");
            },
            tx,
            observed,
        );

        let events = collect(rx).await;
        assert_eq!(events[0], StreamEvent::Chunk("partial".into()));
        assert!(matches!(&events[1], StreamEvent::Error(msg) if msg.contains("worker task failed")));
        assert_eq!(events[2], StreamEvent::Meta(TokenCounts::new(12, 3)));
        assert_eq!(events[3], StreamEvent::End);
        assert_eq!(events.len(), 4);
    }

    #[tokio::test]
    async fn forward_holds_back_end_and_merges_meta() {
        let (tx, rx) = mpsc::channel(8);
        let observed = Mutex::new(TokenCounts::new(7, 0));
        let open = forward(
            vec![
                StreamEvent::Chunk("a".into()),
                StreamEvent::Meta(TokenCounts::new(0, 4)),
                StreamEvent::End,
                StreamEvent::Chunk("after end".into()),
            ],
            &tx,
            &observed,
        )
        .await;
        drop(tx);

        assert!(open);
        assert_eq!(collect(rx).await, vec![StreamEvent::Chunk("a".into())]);
        assert_eq!(*observed.lock().unwrap(), TokenCounts::new(7, 4));
    }

    #[tokio::test]
    async fn forward_reports_dropped_receiver() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let observed = Mutex::new(TokenCounts::default());
        assert!(!forward(vec![StreamEvent::Chunk("x".into())], &tx, &observed).await);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("short", 200), "short");
        assert_eq!(truncate_chars("àèìòù", 3), "àèì");
        assert_eq!(truncate_chars(&"x".repeat(250), 200).len(), 200);
    }
}
