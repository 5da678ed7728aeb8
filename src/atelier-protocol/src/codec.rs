// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Frame codec: inbound text frames to [`InboundMessage`], outbound
//! [`OutboundMessage`] to text.

use serde_json::Value;
use thiserror::Error;

use crate::types::{InboundMessage, OutboundMessage};

/// Frames larger than this are rejected without being parsed.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame exceeds maximum size of {max} bytes (got {len})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Parse one inbound text frame.
///
/// Only JSON objects are accepted; scalars and arrays are reported as
/// [`ProtocolError::NotAnObject`] so callers can log and discard them.
pub fn parse_frame(text: &str) -> Result<InboundMessage, ProtocolError> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            len: text.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    match serde_json::from_str::<Value>(text.trim())? {
        Value::Object(map) => Ok(InboundMessage::from_map(map)),
        other => Err(ProtocolError::NotAnObject(json_kind(&other))),
    }
}

/// Serialize an outbound message to the text sent on the wire.
pub fn encode_message(msg: &OutboundMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(&msg.payload)?)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
