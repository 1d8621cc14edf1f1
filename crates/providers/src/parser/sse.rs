//! Server-Sent Events line classification.

pub(crate) const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine<'a> {
    /// `data: <payload>`
    Data(&'a str),
    /// Comments (`: keep-alive`), `event:`, `id:`, `retry:` and anything
    /// else. Event names are ignored; payloads carry their own `type`.
    Other,
}

pub(crate) fn classify(line: &str) -> SseLine<'_> {
    if let Some(data) = line.strip_prefix("data:") {
        return SseLine::Data(data.trim());
    }
    SseLine::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_lines() {
        assert_eq!(classify("event: message_start"), SseLine::Other);
        assert_eq!(classify("data: {\"x\":1}"), SseLine::Data("{\"x\":1}"));
        assert_eq!(classify("data:[DONE]"), SseLine::Data(DONE_SENTINEL));
        assert_eq!(classify(": OPENROUTER PROCESSING"), SseLine::Other);
        assert_eq!(classify("id: 7"), SseLine::Other);
    }
}
