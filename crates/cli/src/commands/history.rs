//! `switchboard history`: stored turns of one conversation.

use crate::runtime::{Options, Stores};

pub async fn run(
    options: &Options,
    provider: &str,
    channel: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = options
        .load_config()
        .map_err(|e| format!("Failed to load config: {e}"))?;
    let provider = config.resolve_provider(provider);
    let stores = Stores::open(&config, options.ephemeral).await?;

    let turns = stores.chats.load_history(&provider, channel, limit).await?;
    println!("History for {provider} / {channel} ({} turns)", turns.len());
    println!();
    for turn in turns {
        println!("{:>9}: {}", turn.role.as_str(), turn.content);
    }
    Ok(())
}
