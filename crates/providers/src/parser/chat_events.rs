//! SSE typed-event stream (Anthropic Messages API).
//!
//! `message_start` carries the input token count, `content_block_delta`
//! carries text, `message_delta` carries the output token count and
//! `message_stop` (or a `[DONE]` sentinel) ends the stream.

use serde::Deserialize;
use switchboard_core::stream::{StreamEvent, TokenCounts};
use tracing::trace;

use super::sse::{self, DONE_SENTINEL, SseLine};
use super::{Flow, LineProtocol};

#[derive(Debug, Default)]
pub struct ChatEventsParser {
    counts: TokenCounts,
}

impl ChatEventsParser {
    fn record_usage(&mut self, usage: Option<EventUsage>, out: &mut Vec<StreamEvent>) {
        if let Some(usage) = usage {
            self.counts
                .merge(TokenCounts::new(usage.input_tokens, usage.output_tokens));
            out.push(StreamEvent::Meta(self.counts));
        }
    }
}

impl LineProtocol for ChatEventsParser {
    fn on_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) -> Flow {
        // The `event:` line repeats the payload's `type`, so only data matters
        let SseLine::Data(data) = sse::classify(line) else {
            return Flow::Continue;
        };
        if data == DONE_SENTINEL {
            return Flow::Finished;
        }

        let event: ChatEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable SSE event");
                return Flow::Continue;
            }
        };

        match event.kind.as_str() {
            "message_start" => {
                self.record_usage(event.message.and_then(|m| m.usage), out);
            }
            "content_block_delta" => {
                if let Some(text) = event.delta.and_then(|d| d.text) {
                    if !text.is_empty() {
                        out.push(StreamEvent::Chunk(text));
                    }
                }
            }
            "message_delta" => {
                self.record_usage(event.usage, out);
            }
            "message_stop" => return Flow::Finished,
            "error" => {
                let message = event
                    .error
                    .map(|e| e.message)
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "backend reported an error".into());
                out.push(StreamEvent::Error(message));
            }
            _ => {}
        }
        Flow::Continue
    }
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct ChatEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: Option<MessageStart>,
    #[serde(default)]
    delta: Option<EventDelta>,
    #[serde(default)]
    usage: Option<EventUsage>,
    #[serde(default)]
    error: Option<EventError>,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: Option<EventUsage>,
}

#[derive(Debug, Deserialize)]
struct EventDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EventError {
    #[serde(default)]
    message: String,
}

#[cfg(test)]
mod tests {
    use crate::descriptor::WireFormat;
    use crate::parser::parser_for;
    use switchboard_core::stream::{StreamEvent, TokenCounts};

    const STREAM: &str = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"usage\":{\"input_tokens\":25,\"output_tokens\":1}}}\n",
        "\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n",
        "\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hello\"}}\n",
        "\n",
        "event: ping\n",
        "data: {\"type\":\"ping\"}\n",
        "\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" world\"}}\n",
        "\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":12}}\n",
        "\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n",
    );

    fn chunks(events: &[StreamEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_full_stream() {
        let mut parser = parser_for(WireFormat::SseChatEvents);
        let events = parser.feed(STREAM.as_bytes());

        assert_eq!(chunks(&events), vec!["Hello", " world"]);
        let last_meta = events.iter().rev().find_map(|e| match e {
            StreamEvent::Meta(counts) => Some(*counts),
            _ => None,
        });
        assert_eq!(last_meta, Some(TokenCounts::new(25, 12)));
        assert_eq!(events.last(), Some(&StreamEvent::End));
        assert!(parser.finish().is_empty());
    }

    #[test]
    fn byte_at_a_time_matches_whole_feed() {
        let mut parser = parser_for(WireFormat::SseChatEvents);
        let mut events = Vec::new();
        for byte in STREAM.as_bytes() {
            events.extend(parser.feed(std::slice::from_ref(byte)));
        }
        events.extend(parser.finish());
        assert_eq!(chunks(&events), vec!["Hello", " world"]);
        assert_eq!(events.iter().filter(|e| e.is_end()).count(), 1);
    }

    #[test]
    fn malformed_line_is_dropped_and_stream_continues() {
        let mut parser = parser_for(WireFormat::SseChatEvents);
        let mut events = parser.feed(b"data: {this is not json\n\n");
        events.extend(parser.feed(
            b"data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"still here\"}}\n",
        ));
        assert_eq!(events, vec![StreamEvent::Chunk("still here".into())]);
    }

    #[test]
    fn done_sentinel_ends_stream() {
        let mut parser = parser_for(WireFormat::SseChatEvents);
        let events = parser.feed(b"data: [DONE]\ndata: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"late\"}}\n");
        assert_eq!(events, vec![StreamEvent::End]);
    }

    #[test]
    fn error_event_yields_error() {
        let mut parser = parser_for(WireFormat::SseChatEvents);
        let events = parser.feed(
            b"event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n",
        );
        assert_eq!(events, vec![StreamEvent::Error("Overloaded".into())]);
    }

    #[test]
    fn connection_close_without_stop_still_ends() {
        let mut parser = parser_for(WireFormat::SseChatEvents);
        let mut events = parser.feed(
            b"data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"partial\"}}",
        );
        assert!(events.is_empty());
        events.extend(parser.finish());
        assert_eq!(
            events,
            vec![StreamEvent::Chunk("partial".into()), StreamEvent::End]
        );
    }
}
