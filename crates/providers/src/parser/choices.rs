//! SSE `choices` stream (OpenAI-compatible chat completions).

use serde::Deserialize;
use switchboard_core::stream::{StreamEvent, TokenCounts};
use tracing::trace;

use super::sse::{self, DONE_SENTINEL, SseLine};
use super::{Flow, LineProtocol};

#[derive(Debug, Default)]
pub struct ChoicesParser {
    counts: TokenCounts,
}

impl LineProtocol for ChoicesParser {
    fn on_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) -> Flow {
        let SseLine::Data(data) = sse::classify(line) else {
            return Flow::Continue;
        };
        if data == DONE_SENTINEL {
            return Flow::Finished;
        }

        let frame: StreamResponse = match serde_json::from_str(data) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable SSE chunk");
                return Flow::Continue;
            }
        };

        if let Some(error) = frame.error {
            let message = if error.message.is_empty() {
                "backend reported an error".to_string()
            } else {
                error.message
            };
            out.push(StreamEvent::Error(message));
        }

        let content = frame
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content);
        if let Some(text) = content {
            if !text.is_empty() {
                out.push(StreamEvent::Chunk(text));
            }
        }

        if let Some(usage) = frame.usage {
            self.counts
                .merge(TokenCounts::new(usage.prompt_tokens, usage.completion_tokens));
            out.push(StreamEvent::Meta(self.counts));
        }

        Flow::Continue
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}
