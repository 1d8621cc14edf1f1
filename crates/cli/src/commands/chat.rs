//! `switchboard chat`: one message, reply streamed to stdout.

use async_trait::async_trait;
use switchboard_chat::ReplySink;
use tokio::io::AsyncWriteExt;

use crate::runtime::{Options, Stores, build_orchestrator};

struct StdoutSink {
    out: tokio::io::Stdout,
}

#[async_trait]
impl ReplySink for StdoutSink {
    async fn chunk(&mut self, text: &str) {
        // Nothing useful to do if stdout is closed; the turn is still stored.
        let _ = self.out.write_all(text.as_bytes()).await;
        let _ = self.out.flush().await;
    }
}

pub async fn run(
    options: &Options,
    provider: Option<String>,
    no_memory: bool,
    channel: String,
    text: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err("Nothing to send".into());
    }

    let config = options
        .load_config()
        .map_err(|e| format!("Failed to load config: {e}"))?;
    let stores = Stores::open(&config, options.ephemeral).await?;
    let orchestrator = build_orchestrator(config, &stores).await;

    let mut session = orchestrator.new_session(channel);
    if no_memory && session.memory_enabled() {
        session.toggle_memory();
    }

    let mut sink = StdoutSink {
        out: tokio::io::stdout(),
    };
    let outcome = orchestrator
        .execute(
            &mut session,
            provider.as_deref().unwrap_or_default(),
            &text,
            &mut sink,
        )
        .await;
    println!();

    orchestrator.finish_background().await;

    let answered_by = match &outcome.agent {
        Some(agent) => format!("{} ({agent})", outcome.provider),
        None => outcome.provider.clone(),
    };
    eprintln!(
        "[{} | {} ms | {} in / {} out tokens]",
        answered_by,
        outcome.latency_ms,
        outcome.counts.input_tokens,
        outcome.counts.output_tokens
    );

    if !outcome.succeeded {
        return Err(format!("No provider answered (last tried: {})", outcome.provider).into());
    }
    Ok(())
}
