//! `switchboard serve`: start the WebSocket gateway.

use std::sync::Arc;

use crate::runtime::{Options, Stores, build_orchestrator};

pub async fn run(options: &Options, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let config = options
        .load_config()
        .map_err(|e| format!("Failed to load config: {e}"))?;
    let stores = Stores::open(&config, options.ephemeral).await?;

    println!("Switchboard gateway");
    println!(
        "   Listening: {}:{}",
        config.gateway.host,
        port.unwrap_or(config.gateway.port)
    );
    println!("   Default provider: {}", config.default_provider);
    if options.ephemeral {
        println!("   Storage: in memory (nothing is kept after exit)");
    }

    let orchestrator = Arc::new(build_orchestrator(config, &stores).await);
    switchboard_gateway::start(orchestrator, port).await
}
