//! Incremental parser for the coordinator's server-push stream. Bytes
//! accumulate in a buffer; records split on blank-line boundaries, each
//! yielding an `event:` field and a `data:` field.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
}

#[derive(Default)]
pub struct SseParser {
    buf: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every complete event it closed off.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        loop {
            let Some((boundary, skip)) = find_blank_line(&self.buf) else {
                break;
            };
            let block: Vec<u8> = self.buf.drain(..boundary + skip).collect();
            let block = String::from_utf8_lossy(&block[..boundary]).into_owned();
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }
}

/// Locate the first blank line (`\n\n` or `\r\n\r\n`). Returns the
/// offset of the separator and its length.
fn find_blank_line(buf: &[u8]) -> Option<(usize, usize)> {
    for i in 0..buf.len() {
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        if buf[i..].starts_with(b"\n\n") {
            return Some((i, 2));
        }
    }
    None
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines = Vec::new();

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim_start().to_string());
        }
        // Comment lines (":…") and unknown fields are ignored.
    }

    let event = event?;
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}
