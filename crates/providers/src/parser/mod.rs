//! Incremental stream parsers, one per wire format.
//!
//! Parsers accept raw bytes exactly as they arrive from the socket. Reads
//! may split a line (or a UTF-8 sequence) anywhere, or carry several lines
//! at once. Every parser emits [`StreamEvent::End`] exactly once, either when
//! the protocol signals completion or from [`StreamParser::finish`], and
//! emits nothing afterwards. Malformed lines are dropped.

mod chat_events;
mod choices;
mod ndjson;
mod sse;

pub use chat_events::ChatEventsParser;
pub use choices::ChoicesParser;
pub use ndjson::{MessageLinesParser, TypedLinesParser};

use switchboard_core::stream::StreamEvent;

use crate::descriptor::WireFormat;

/// Turns a byte stream into normalized events.
pub trait StreamParser: Send {
    /// Consume one read's worth of bytes.
    fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent>;

    /// The connection closed: flush any trailing partial line and end the
    /// stream if the protocol has not already done so.
    fn finish(&mut self) -> Vec<StreamEvent>;

    /// Whether `End` has been emitted.
    fn is_finished(&self) -> bool;
}

/// Select the parser for a wire format.
pub fn parser_for(format: WireFormat) -> Box<dyn StreamParser> {
    match format {
        WireFormat::SseChatEvents => Box::new(Framed::new(ChatEventsParser::default())),
        WireFormat::SseChoices => Box::new(Framed::new(ChoicesParser::default())),
        WireFormat::NdjsonMessage => Box::new(Framed::new(MessageLinesParser::default())),
        WireFormat::NdjsonTyped => Box::new(Framed::new(TypedLinesParser)),
    }
}

/// Whether a protocol wants more lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Finished,
}

/// Per-line interpretation of one protocol.
pub(crate) trait LineProtocol: Send {
    /// Handle one complete, trimmed, non-empty line.
    fn on_line(&mut self, line: &str, out: &mut Vec<StreamEvent>) -> Flow;
}

/// Longest unterminated line a backend may send.
pub(crate) const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits raw bytes into lines. Bytes are buffered until a newline arrives,
/// so multi-byte characters split across reads decode intact.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append bytes and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// The unterminated tail has grown past [`MAX_LINE_BYTES`].
    pub fn overflowed(&self) -> bool {
        self.pending.len() > MAX_LINE_BYTES
    }

    /// Whatever is left after the last newline.
    pub fn take_rest(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = decode_line(&self.pending);
        self.pending.clear();
        Some(rest)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Adapts a [`LineProtocol`] to [`StreamParser`], owning line splitting and
/// the single-`End` guarantee.
pub(crate) struct Framed<P> {
    lines: LineBuffer,
    protocol: P,
    finished: bool,
}

impl<P: LineProtocol> Framed<P> {
    pub fn new(protocol: P) -> Self {
        Self {
            lines: LineBuffer::default(),
            protocol,
            finished: false,
        }
    }

    fn process(&mut self, line: &str, out: &mut Vec<StreamEvent>) {
        let line = line.trim();
        if line.is_empty() || self.finished {
            return;
        }
        if self.protocol.on_line(line, out) == Flow::Finished {
            out.push(StreamEvent::End);
            self.finished = true;
        }
    }
}

impl<P: LineProtocol> StreamParser for Framed<P> {
    fn feed(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        for line in self.lines.push(bytes) {
            self.process(&line, &mut out);
            if self.finished {
                return out;
            }
        }
        if self.lines.overflowed() {
            self.lines = LineBuffer::default();
            out.push(StreamEvent::Error(format!(
                "stream line exceeds {MAX_LINE_BYTES} bytes without a newline"
            )));
            out.push(StreamEvent::End);
            self.finished = true;
        }
        out
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        if let Some(rest) = self.lines.take_rest() {
            self.process(&rest, &mut out);
        }
        if !self.finished {
            out.push(StreamEvent::End);
            self.finished = true;
        }
        out
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
