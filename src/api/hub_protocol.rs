//! SignalR JSON hub protocol framing.
//!
//! Each record is a JSON object followed by the `0x1E` separator; a single
//! WebSocket text message may carry several records.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

pub const RECORD_SEPARATOR: char = '\u{1e}';

const INVOCATION: u64 = 1;
const COMPLETION: u64 = 3;
const PING: u64 = 6;
const CLOSE: u64 = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum HubFrame {
    Invocation {
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: Option<String>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Stream items, cancellations and future record types.
    Other(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubProtocolError {
    #[error("malformed hub record: {0}")]
    Malformed(String),
    #[error("hub record has no type")]
    MissingType,
    #[error("invocation record has no target")]
    MissingTarget,
    #[error("hub rejected the handshake: {0}")]
    HandshakeRejected(String),
    #[error("handshake response is incomplete")]
    HandshakeIncomplete,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(rename = "type")]
    kind: Option<u64>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

pub fn handshake_request() -> String {
    format!("{}{RECORD_SEPARATOR}", json!({"protocol": "json", "version": 1}))
}

/// Checks the handshake response and returns whatever followed it in the
/// same message.
pub fn parse_handshake_response(text: &str) -> Result<&str, HubProtocolError> {
    let (response, rest) = text
        .split_once(RECORD_SEPARATOR)
        .ok_or(HubProtocolError::HandshakeIncomplete)?;
    let parsed: HandshakeResponse = serde_json::from_str(response)
        .map_err(|error| HubProtocolError::Malformed(error.to_string()))?;
    match parsed.error {
        Some(error) => Err(HubProtocolError::HandshakeRejected(error)),
        None => Ok(rest),
    }
}

pub fn split_records(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|record| !record.is_empty())
}

pub fn decode_frame(record: &str) -> Result<HubFrame, HubProtocolError> {
    let raw: RawRecord = serde_json::from_str(record)
        .map_err(|error| HubProtocolError::Malformed(error.to_string()))?;

    match raw.kind.ok_or(HubProtocolError::MissingType)? {
        INVOCATION => Ok(HubFrame::Invocation {
            target: raw.target.ok_or(HubProtocolError::MissingTarget)?,
            arguments: raw.arguments,
        }),
        COMPLETION => Ok(HubFrame::Completion {
            invocation_id: raw.invocation_id,
            error: raw.error,
        }),
        PING => Ok(HubFrame::Ping),
        CLOSE => Ok(HubFrame::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect.unwrap_or(false),
        }),
        other => Ok(HubFrame::Other(other)),
    }
}

/// Fire-and-forget invocation: no invocation id, so the hub sends no completion.
pub fn encode_invocation(target: &str, arguments: &[Value]) -> String {
    format!(
        "{}{RECORD_SEPARATOR}",
        json!({"type": INVOCATION, "target": target, "arguments": arguments})
    )
}

pub fn encode_ping() -> String {
    format!("{}{RECORD_SEPARATOR}", json!({"type": PING}))
}
