//! Backend plumbing for Switchboard.
//!
//! The router turns configuration into one [`Backend`] per provider id and
//! builds a fresh [`ProviderDescriptor`] for every attempt. The worker sends
//! the descriptor over HTTP and normalizes the response through the parser
//! matching its [`WireFormat`].

pub mod anthropic;
pub mod bridge;
pub mod descriptor;
pub mod ollama;
pub mod openai_compat;
pub mod parser;
pub mod router;
pub mod worker;

pub use anthropic::AnthropicBackend;
pub use bridge::BridgeBackend;
pub use descriptor::{Endpoint, ProviderDescriptor, WireFormat};
pub use ollama::OllamaBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use parser::{StreamParser, parser_for};
pub use router::{Backend, ProviderRouter, build_from_config};
pub use worker::{EVENT_CHANNEL_CAPACITY, HttpTransport, StreamTransport, run_worker};
