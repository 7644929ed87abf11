//! Server-sent-event framing for streamed generations.

use super::types::{Delta, StreamChunk, StreamEvent};
use crate::error::{GatewayError, GatewayResult};

/// Accumulates raw bytes and yields complete lines.
///
/// Bytes are buffered until a newline arrives so multi-byte UTF-8 sequences
/// split across network chunks decode intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every complete line (without the newline).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Whatever is left once the byte stream ends.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Payload of a `data:` line; other SSE fields are ignored.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|rest| rest.trim_start())
}

/// Translate one `data:` payload into the chunk it carries, if any.
///
/// Unparseable payloads are a hard error: the upstream is speaking a
/// protocol we do not understand.
pub fn decode_event(data: &str) -> GatewayResult<Option<StreamChunk>> {
    let event: StreamEvent =
        serde_json::from_str(data).map_err(|e| GatewayError::InvalidResponse {
            message: format!("Malformed stream event: {}", e),
        })?;

    match event {
        StreamEvent::ContentBlockDelta {
            delta: Delta::TextDelta { text },
        } => Ok(Some(StreamChunk::Delta(text))),
        StreamEvent::MessageStop => Ok(Some(StreamChunk::Done)),
        StreamEvent::Error { error } => Err(GatewayError::Api {
            status: 500,
            message: match error.error_type {
                Some(kind) => format!("{}: {}", kind, error.message),
                None => error.message,
            },
        }),
        _ => Ok(None),
    }
}
