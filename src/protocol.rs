//! The JSON RPC envelope exchanged over the provider WebSocket.
//!
//! ```json
//! { "command": "register", "id": 1, "data": { "code": "", "secret": "" } }
//! ```
//!
//! `id` correlates a `response` frame with the request that triggered it.
//! `data` is omitted on `ping`/`pong`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame in either direction. Outbound frames that carry no `data` (pings,
/// bridge commands) skip the field entirely via `skip_serializing_if`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub command: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Frame {
    pub fn new(command: impl Into<String>, id: u64, data: Option<Value>) -> Self {
        Self { command: command.into(), id, data }
    }

    pub fn pong(id: u64) -> Self {
        Self { command: "pong".into(), id, data: None }
    }

    pub fn response(id: u64, data: Value) -> Self {
        Self { command: "response".into(), id, data: Some(data) }
    }
}

/// Payload carried by a `register` frame's `data` field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterPayload {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<Versions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Versions {
    pub hardware_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_reply_has_no_data_field() {
        let frame = Frame::pong(2);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"command":"pong","id":2}"#);
    }

    #[test]
    fn register_payload_round_trips_through_value() {
        let payload = RegisterPayload {
            code: "ABCD".into(),
            secret: "sekret".into(),
            commit: Some("deadbeef".into()),
            versions: Some(Versions { hardware_version: "1.0".into() }),
        };
        let value = serde_json::to_value(&payload).unwrap();
        let back: RegisterPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.code, "ABCD");
        assert_eq!(back.secret, "sekret");
    }

    #[test]
    fn empty_register_payload_defaults_code_and_secret() {
        let payload: RegisterPayload = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(payload.code, "");
        assert_eq!(payload.secret, "");
    }
}
