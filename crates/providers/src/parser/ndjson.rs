//! Newline-delimited JSON streams.
//!
//! Two shapes share the framing:
//! - message lines (Ollama): `{"message":{"content":".."},"done":false}`,
//!   the final line has `done: true` plus `prompt_eval_count`/`eval_count`
//! - typed lines (local bridge): `{"type":"chunk","text":".."}`,
//!   `{"type":"done"}`, `{"type":"error","text":".."}`

use serde::Deserialize;
use switchboard_core::stream::{StreamEvent, TokenCounts};
use tracing::trace;

use super::{Flow, LineProtocol};

#[derive(Debug, Default)]
pub struct MessageLinesParser {
    counts: TokenCounts,
}

impl LineProtocol for MessageLinesParser {
    fn on_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) -> Flow {
        let frame: MessageLine = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(error = %e, line = %line, "Ignoring unparseable NDJSON line");
                return Flow::Continue;
            }
        };

        if let Some(error) = frame.error {
            out.push(StreamEvent::Error(error));
            return Flow::Finished;
        }

        if let Some(message) = frame.message {
            if !message.content.is_empty() {
                out.push(StreamEvent::Chunk(message.content));
            }
        }

        if frame.done {
            self.counts
                .merge(TokenCounts::new(frame.prompt_eval_count, frame.eval_count));
            out.push(StreamEvent::Meta(self.counts));
            return Flow::Finished;
        }
        Flow::Continue
    }
}

#[derive(Debug, Default)]
pub struct TypedLinesParser;

impl LineProtocol for TypedLinesParser {
    fn on_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) -> Flow {
        let frame: TypedLine = match serde_json::from_str(line) {
            Ok(frame) => frame,
            Err(e) => {
                trace!(error = %e, line = %line, "Ignoring unparseable NDJSON line");
                return Flow::Continue;
            }
        };

        match frame.kind.as_str() {
            "chunk" => {
                if !frame.text.is_empty() {
                    out.push(StreamEvent::Chunk(frame.text));
                }
                Flow::Continue
            }
            "done" => Flow::Finished,
            "error" => {
                let message = if frame.text.is_empty() {
                    "bridge reported an error".to_string()
                } else {
                    frame.text
                };
                out.push(StreamEvent::Error(message));
                Flow::Finished
            }
            _ => Flow::Continue,
        }
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct MessageLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TypedLine {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use crate::descriptor::WireFormat;
    use crate::parser::parser_for;
    use switchboard_core::stream::{StreamEvent, TokenCounts};

    #[test]
    fn message_lines_with_counts() {
        let mut parser = parser_for(WireFormat::NdjsonMessage);
        let mut events = parser.feed(b"{\"model\":\"gemma3:1b\",\"message\":{\"role\":\"assistant\",\"content\":\"Buon\"},\"done\":false}\n{\"message\":{\"role\":\"assistant\",\"content\":\"giorno\"},");
        events.extend(parser.feed(b"\"done\":false}\n{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"prompt_eval_count\":31,\"eval_count\":7}\n"));
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk("Buon".into()),
                StreamEvent::Chunk("giorno".into()),
                StreamEvent::Meta(TokenCounts::new(31, 7)),
                StreamEvent::End,
            ]
        );
    }

    #[test]
    fn message_line_error_is_terminal() {
        let mut parser = parser_for(WireFormat::NdjsonMessage);
        let events = parser.feed(b"{\"error\":\"model 'x' not found\"}\n");
        assert_eq!(
            events,
            vec![
                StreamEvent::Error("model 'x' not found".into()),
                StreamEvent::End
            ]
        );
    }

    #[test]
    fn typed_lines() {
        let mut parser = parser_for(WireFormat::NdjsonTyped);
        let events = parser.feed(
            b"{\"type\":\"chunk\",\"text\":\"one \"}\nnot json\n{\"type\":\"status\",\"text\":\"thinking\"}\n{\"type\":\"chunk\",\"text\":\"two\"}\n{\"type\":\"done\"}\n",
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Chunk("one ".into()),
                StreamEvent::Chunk("two".into()),
                StreamEvent::End,
            ]
        );
    }

    #[test]
    fn typed_error_is_terminal() {
        let mut parser = parser_for(WireFormat::NdjsonTyped);
        let events = parser.feed(b"{\"type\":\"error\",\"text\":\"bad token\"}\n{\"type\":\"chunk\",\"text\":\"x\"}\n");
        assert_eq!(
            events,
            vec![StreamEvent::Error("bad token".into()), StreamEvent::End]
        );
        assert!(parser.finish().is_empty());
    }
}
