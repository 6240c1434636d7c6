//! Inbound event parsing and the relay envelope.

use crate::client::{ClientId, ClientIdentity};
use crate::error::RealtimeError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event emitted to a client right after it connects.
pub const WELCOME_EVENT: &str = "welcome";

/// Event sent back to a client whose message could not be parsed.
pub const ERROR_EVENT: &str = "error";

/// A parsed inbound message: `{"event": "<name>", ...payload fields}`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Event name.
    pub event: String,
    /// Remaining fields of the message.
    pub payload: Value,
}

impl InboundEvent {
    /// Parse a text frame.
    ///
    /// The body must be a JSON object carrying a string `event` field. The
    /// payload is the object without that field.
    pub fn parse(text: &str) -> Result<Self, RealtimeError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| RealtimeError::Protocol(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Build an event from an already decoded message.
    pub fn from_value(value: Value) -> Result<Self, RealtimeError> {
        let mut fields: Map<String, Value> = match value {
            Value::Object(fields) => fields,
            other => {
                return Err(RealtimeError::Protocol(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let event = match fields.remove("event") {
            Some(Value::String(name)) if !name.is_empty() => name,
            Some(Value::String(_)) => {
                return Err(RealtimeError::Protocol("empty \"event\" field".to_string()))
            }
            Some(other) => {
                return Err(RealtimeError::Protocol(format!(
                    "\"event\" must be a string, got {}",
                    json_kind(&other)
                )))
            }
            None => return Err(RealtimeError::Protocol("missing \"event\" field".to_string())),
        };

        Ok(Self {
            event,
            payload: Value::Object(fields),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Message relayed to other clients for events without a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Original event name.
    pub event: String,
    /// Sender's client id.
    pub sender_id: Option<ClientId>,
    /// Sender's display name.
    pub sender_name: Option<String>,
    /// Original payload, verbatim.
    pub data: Value,
}

impl Envelope {
    /// Wrap `data` sent by `sender`.
    pub fn new(event: impl Into<String>, sender: &ClientIdentity, data: Value) -> Self {
        Self {
            event: event.into(),
            sender_id: sender.client_id.clone(),
            sender_name: sender.display_name.clone(),
            data,
        }
    }

    /// JSON form of the envelope.
    pub fn to_value(&self) -> Result<Value, RealtimeError> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_strips_event_field() {
        let event = InboundEvent::parse(r#"{"event":"hello","name":"John"}"#).unwrap();
        assert_eq!(event.event, "hello");
        assert_eq!(event.payload, json!({"name": "John"}));
    }

    #[test]
    fn test_parse_event_only() {
        let event = InboundEvent::parse(r#"{"event":"custom_noone_handles"}"#).unwrap();
        assert_eq!(event.payload, json!({}));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for text in [
            "not json",
            "[1,2]",
            r#"{"name":"John"}"#,
            r#"{"event":42}"#,
            r#"{"event":""}"#,
        ] {
            let err = InboundEvent::parse(text).unwrap_err();
            assert!(matches!(err, RealtimeError::Protocol(_)), "{text}");
        }
    }

    #[test]
    fn test_envelope_shape() {
        let sender = ClientIdentity {
            client_id: Some("id-1".to_string()),
            display_name: Some("Ivy".to_string()),
        };
        let envelope = Envelope::new("draw", &sender, json!({"x": 1}));

        assert_eq!(
            envelope.to_value().unwrap(),
            json!({
                "event": "draw",
                "sender_id": "id-1",
                "sender_name": "Ivy",
                "data": {"x": 1}
            })
        );
    }

    #[test]
    fn test_envelope_from_unknown_sender() {
        let envelope = Envelope::new("draw", &ClientIdentity::unknown(), json!({}));
        let value = envelope.to_value().unwrap();
        assert!(value["sender_id"].is_null());
        assert!(value["sender_name"].is_null());
    }
}
