//! Worker line protocol.
//!
//! Workers write newline-terminated UTF-8. A line holding a JSON object with a
//! non-null `result` key is the job result; every other line is progress text.

use serde::Serialize;
use serde_json::{json, Value};

use crate::ProcessEvent;

/// Classification of a single output line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    /// Empty or whitespace-only; not forwarded.
    Blank,
    Log(String),
    Result(Value),
    /// Looked like a structured object but failed to decode. Still shown as progress.
    Malformed { text: String, reason: String },
}

impl LineKind {
    pub fn into_event(self) -> Option<ProcessEvent> {
        match self {
            LineKind::Blank => None,
            LineKind::Log(text) | LineKind::Malformed { text, .. } => {
                Some(ProcessEvent::Log { text })
            }
            LineKind::Result(payload) => Some(ProcessEvent::Result { payload }),
        }
    }
}

/// Decodes a line and classifies it.
pub fn classify_line(line: &str) -> LineKind {
    let text = line.trim_end_matches(['\r', '\n']);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if !trimmed.starts_with('{') {
        return LineKind::Log(text.to_string());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(mut object)) => match object.remove("result") {
            Some(payload) if !payload.is_null() => LineKind::Result(payload),
            _ => LineKind::Log(text.to_string()),
        },
        Ok(_) => LineKind::Log(text.to_string()),
        Err(err) => LineKind::Malformed {
            text: text.to_string(),
            reason: err.to_string(),
        },
    }
}

/// Encodes a result payload as a protocol line (with trailing newline).
pub fn result_line<T: Serialize>(payload: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&json!({ "result": payload }))?;
    line.push('\n');
    Ok(line)
}

/// Splits a byte stream into lines, keeping the unterminated tail until
/// more bytes arrive or the stream ends.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Returns the unterminated tail, if any, leaving the buffer empty.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_suffix('\r').unwrap_or(&*text).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_holds_partial_line_until_newline() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"Navigat").is_empty());
        assert_eq!(buffer.push(b"ing to URL\nDo"), vec!["Navigating to URL"]);
        assert_eq!(buffer.finish().as_deref(), Some("Do"));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn buffer_strips_carriage_returns() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"a\r\nb\n"), vec!["a", "b"]);
    }

    #[test]
    fn buffer_survives_split_utf8_sequences() {
        let mut buffer = LineBuffer::new();
        let bytes = "café\n".as_bytes();
        assert!(buffer.push(&bytes[..4]).is_empty());
        assert_eq!(buffer.push(&bytes[4..]), vec!["café"]);
    }

    #[test]
    fn null_result_is_not_a_result() {
        assert_eq!(
            classify_line(r#"{"result":null}"#),
            LineKind::Log(r#"{"result":null}"#.to_string())
        );
    }

    #[test]
    fn broken_object_is_malformed_but_still_logged() {
        let kind = classify_line(r#"{"result": {"title": "#);
        assert!(matches!(kind, LineKind::Malformed { .. }));
        assert_eq!(
            kind.into_event(),
            Some(ProcessEvent::log(r#"{"result": {"title": "#))
        );
    }

    #[test]
    fn result_line_round_trips_through_classifier() {
        let line = result_line(&json!({"title": "T"})).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(classify_line(&line), LineKind::Result(json!({"title": "T"})));
    }
}
