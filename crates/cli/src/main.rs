//! Switchboard CLI, the main entry point.
//!
//! Commands:
//! - `serve`     : start the WebSocket gateway
//! - `chat`      : send one message and stream the reply to stdout
//! - `entities`  : list remembered entities
//! - `forget`    : delete an entity and its relations
//! - `history`   : show stored turns of a conversation
//! - `providers` : list configured providers and whether they are usable

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod runtime;

use runtime::Options;

#[derive(Parser)]
#[command(
    name = "switchboard",
    about = "Switchboard: streaming chat gateway with provider failover",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Configuration file (default: ~/.switchboard/config.toml)
    #[arg(long, global = true, env = "SWITCHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Keep everything in memory instead of the SQLite database
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the WebSocket gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message and stream the reply
    Chat {
        /// Provider id, alias or `auto` (default: the configured default provider)
        #[arg(short, long)]
        provider: Option<String>,

        /// Skip memory enrichment for this message
        #[arg(long)]
        no_memory: bool,

        /// Conversation channel
        #[arg(long, default_value = "cli")]
        channel: String,

        /// The message
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },

    /// List remembered entities, most frequent first
    Entities {
        /// Only this kind: tech, person or place
        #[arg(short, long)]
        kind: Option<String>,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete an entity together with its relations
    Forget {
        /// Entity id, as shown by `entities`
        id: i64,
    },

    /// Show the stored turns of a conversation
    History {
        #[arg(short, long)]
        provider: String,

        #[arg(long, default_value = "dashboard")]
        channel: String,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// List configured providers
    Providers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    let options = Options {
        config_path: cli.config,
        ephemeral: cli.ephemeral,
    };

    match cli.command {
        Commands::Serve { port } => commands::serve::run(&options, port).await?,
        Commands::Chat {
            provider,
            no_memory,
            channel,
            text,
        } => commands::chat::run(&options, provider, no_memory, channel, text.join(" ")).await?,
        Commands::Entities { kind, limit } => {
            commands::entities::list(&options, kind.as_deref(), limit).await?
        }
        Commands::Forget { id } => commands::entities::forget(&options, id).await?,
        Commands::History {
            provider,
            channel,
            limit,
        } => commands::history::run(&options, &provider, &channel, limit).await?,
        Commands::Providers => commands::providers::run(&options)?,
    }

    Ok(())
}

/// Logs go to stderr so `chat` output on stdout stays clean.
fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
}
