//! Wire codec for JSON-RPC envelopes
//!
//! Responses travel either as a single plain JSON document or as a Server-Sent-Events
//! body whose first `data:` record holds the envelope. Both shapes decode into the same
//! [`JsonRpcResponse`]; the server always encodes with event-stream framing.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::mcp::rpc::JsonRpcResponse;

pub const MIME_APPLICATION_JSON: &str = "application/json";
pub const MIME_TEXT_EVENT_STREAM: &str = "text/event-stream";

pub const SSE_DATA_PREFIX: &str = "data:";
pub const SSE_COMMENT_PREFIX: char = ':';
pub const SSE_DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("no data record found in event stream")]
    NoDataInStream,
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// The body is exactly one JSON envelope.
    PlainEnvelope,
    /// The body is an event stream; the first data record is the envelope.
    StreamedEnvelope,
}

impl Framing {
    /// Picks the framing from a `Content-Type` value, ignoring parameters and case.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            MIME_APPLICATION_JSON => Some(Self::PlainEnvelope),
            MIME_TEXT_EVENT_STREAM => Some(Self::StreamedEnvelope),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::PlainEnvelope => MIME_APPLICATION_JSON,
            Self::StreamedEnvelope => MIME_TEXT_EVENT_STREAM,
        }
    }
}

/// Encodes any envelope. Streamed framing emits one data record and the terminal sentinel.
pub fn encode<T: Serialize>(envelope: &T, framing: Framing) -> Result<Vec<u8>, CodecError> {
    let json = serde_json::to_vec(envelope)?;

    Ok(match framing {
        Framing::PlainEnvelope => json,
        Framing::StreamedEnvelope => {
            let mut body = Vec::with_capacity(json.len() + 32);
            body.extend_from_slice(b"data: ");
            body.extend_from_slice(&json);
            body.extend_from_slice(b"\n\n");
            body.extend_from_slice(b"data: ");
            body.extend_from_slice(SSE_DONE_SENTINEL.as_bytes());
            body.extend_from_slice(b"\n\n");
            body
        }
    })
}

/// Extracts the JSON payload of a body without interpreting it as an envelope.
pub fn decode_payload(body: &[u8], framing: Framing) -> Result<Value, CodecError> {
    match framing {
        Framing::PlainEnvelope => serde_json::from_slice(body)
            .map_err(|err| CodecError::MalformedEnvelope(err.to_string())),
        Framing::StreamedEnvelope => {
            let mut decoder = EventStreamDecoder::new();
            match decoder.feed(body) {
                Some(payload) => Ok(payload),
                None => decoder.finish(),
            }
        }
    }
}

pub fn decode(body: &[u8], framing: Framing) -> Result<JsonRpcResponse, CodecError> {
    decode_payload(body, framing).and_then(envelope_from_value)
}

pub fn envelope_from_value(value: Value) -> Result<JsonRpcResponse, CodecError> {
    serde_json::from_value(value).map_err(|err| CodecError::MalformedEnvelope(err.to_string()))
}

/// Line-oriented event-stream reader that yields the first parseable data record.
///
/// Chunks may split lines anywhere; incomplete lines are buffered until their newline
/// arrives or [`finish`](Self::finish) is called.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    pending: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns the first data payload completed by it, if any.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Value> {
        self.pending.extend_from_slice(chunk);

        while let Some(newline) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(payload) = parse_line(&line) {
                return Some(payload);
            }
        }

        None
    }

    /// Flushes a trailing unterminated line at end of stream.
    pub fn finish(mut self) -> Result<Value, CodecError> {
        let rest = std::mem::take(&mut self.pending);
        parse_line(&rest).ok_or(CodecError::NoDataInStream)
    }
}

fn parse_line(raw: &[u8]) -> Option<Value> {
    let line = std::str::from_utf8(raw).ok()?.trim();

    if line.is_empty() || line.starts_with(SSE_COMMENT_PREFIX) {
        return None;
    }

    let data = line.strip_prefix(SSE_DATA_PREFIX)?.trim();
    if data.is_empty() || data == SSE_DONE_SENTINEL {
        return None;
    }

    serde_json::from_str(data).ok()
}
