// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde_json::{json, Map, Value};

/// How an outbound message is treated while the session is not connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// Telemetry that is worthless once stale; dropped when disconnected.
    Ephemeral,
    /// Buffered (bounded) until the next connection.
    Reliable,
}

/// A JSON record queued for transmission to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub class: MessageClass,
    pub payload: Value,
}

impl OutboundMessage {
    pub fn new(class: MessageClass, payload: Value) -> Self {
        Self { class, payload }
    }

    pub fn ephemeral(payload: Value) -> Self {
        Self::new(MessageClass::Ephemeral, payload)
    }

    pub fn reliable(payload: Value) -> Self {
        Self::new(MessageClass::Reliable, payload)
    }

    /// `{"<field>": "<value>"}`, the step announcement every workshop sends.
    pub fn state_update(field: &str, value: &str) -> Self {
        let mut map = Map::new();
        map.insert(field.to_string(), Value::String(value.to_string()));
        Self::reliable(Value::Object(map))
    }

    /// `{"type": "<kind>", "value": <value>}` with the given delivery class.
    pub fn typed(class: MessageClass, kind: &str, value: Value) -> Self {
        Self::new(class, json!({ "type": kind, "value": value }))
    }

    pub fn is_reliable(&self) -> bool {
        self.class == MessageClass::Reliable
    }
}

/// Typed inbound/outbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedEnvelope {
    /// The `type` field.
    pub kind: String,
    /// The `value` field, `null` when absent.
    pub value: Value,
}

/// A parsed inbound frame. Always a JSON object; unknown keys are kept but
/// never interpreted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InboundMessage {
    fields: Map<String, Value>,
}

impl InboundMessage {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// The `type` field of a typed envelope.
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    /// The `value` field of a typed envelope.
    pub fn value(&self) -> Option<&Value> {
        self.fields.get("value")
    }

    /// Decode as a typed envelope, if it is one.
    pub fn envelope(&self) -> Option<TypedEnvelope> {
        let kind = self.kind()?.to_string();
        Some(TypedEnvelope {
            kind,
            value: self.value().cloned().unwrap_or(Value::Null),
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// True when `key` is present with a truthy value (`true`, a non-zero
    /// number, a non-empty string other than `"false"`, or a non-empty
    /// array/object).
    pub fn flag(&self, key: &str) -> bool {
        self.fields.get(key).map(is_truthy).unwrap_or(false)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false"),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbound(value: Value) -> InboundMessage {
        match value {
            Value::Object(map) => InboundMessage::from_map(map),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn state_update_builds_single_key_object() {
        let msg = OutboundMessage::state_update("stranger_state", "inactive");
        assert!(msg.is_reliable());
        assert_eq!(msg.payload, json!({ "stranger_state": "inactive" }));
    }

    #[test]
    fn typed_builds_envelope() {
        let msg = OutboundMessage::typed(MessageClass::Ephemeral, "light", json!(412));
        assert_eq!(msg.class, MessageClass::Ephemeral);
        assert_eq!(msg.payload, json!({ "type": "light", "value": 412 }));
    }

    #[test]
    fn flags_follow_truthiness() {
        let msg = inbound(json!({
            "start_system": true,
            "reset_system": false,
            "count": 0,
            "label": "false",
            "other": "yes",
        }));
        assert!(msg.flag("start_system"));
        assert!(!msg.flag("reset_system"));
        assert!(!msg.flag("count"));
        assert!(!msg.flag("label"));
        assert!(msg.flag("other"));
        assert!(!msg.flag("missing"));
    }

    #[test]
    fn envelope_accessors() {
        let msg = inbound(json!({ "type": "set_color", "value": { "r": 1 } }));
        assert_eq!(msg.kind(), Some("set_color"));
        let env = msg.envelope().expect("typed envelope");
        assert_eq!(env.kind, "set_color");
        assert_eq!(env.value, json!({ "r": 1 }));

        let flat = inbound(json!({ "start_system": true }));
        assert!(flat.kind().is_none());
        assert!(flat.envelope().is_none());
    }
}
