//! Incremental decoder for the `text/event-stream` wire format.

/// Event type assumed when a message has no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// Value of the `id:` field, if the message carried one.
    pub id: Option<String>,
    /// Value of the `event:` field, or `"message"`.
    pub event: String,
    /// Concatenated `data:` lines, joined with `\n`.
    pub data: String,
}

#[derive(Debug, Default)]
struct Pending {
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
}

/// Splits arbitrary byte chunks into complete messages.
///
/// Lines end in `\n` or `\r\n`. A blank line dispatches the pending message
/// if it carried at least one `data:` line. Comment lines (leading `:`) and
/// unknown fields are skipped. Bytes of an incomplete line are buffered
/// across chunks, so multi-byte characters may be split anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    pending: Pending,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every message it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);

        let mut messages = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(message) = self.process_line(&String::from_utf8_lossy(&line)) {
                messages.push(message);
            }
        }
        messages
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            let pending = std::mem::take(&mut self.pending);
            if pending.data.is_empty() {
                return None;
            }
            return Some(SseMessage {
                id: pending.id,
                event: pending.event.unwrap_or_else(|| DEFAULT_EVENT.to_owned()),
                data: pending.data.join("\n"),
            });
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "id" if !value.contains('\0') => self.pending.id = Some(value.to_owned()),
            "event" => self.pending.event = Some(value.to_owned()),
            "data" => self.pending.data.push(value.to_owned()),
            _ => {}
        }
        None
    }
}
