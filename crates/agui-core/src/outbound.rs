//! Frames the client sends to the server.
//!
//! The server dispatches on a snake_case `type` field (`user_message`,
//! `ping`, `get_state`). Arbitrary JSON and pre-encoded text are passed
//! through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::now_millis;

/// A typed client command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Chat input from the user.
    UserMessage {
        /// Message text.
        content: String,
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// Liveness check; the server answers with `pong`.
    Ping {
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
    /// Ask for a `STATE_SNAPSHOT` of the current state.
    GetState {
        /// Send time, epoch milliseconds.
        timestamp: i64,
    },
}

/// Anything the client can put on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum OutboundMessage {
    /// A typed command.
    Command(ClientCommand),
    /// Arbitrary JSON, serialized on send.
    Json(Value),
    /// Pre-encoded text, sent verbatim.
    Text(String),
}

impl OutboundMessage {
    /// `user_message` stamped with the current time.
    pub fn user_message(content: impl Into<String>) -> Self {
        Self::Command(ClientCommand::UserMessage {
            content: content.into(),
            timestamp: now_millis(),
        })
    }

    /// `ping` stamped with the current time.
    pub fn ping() -> Self {
        Self::Command(ClientCommand::Ping {
            timestamp: now_millis(),
        })
    }

    /// `get_state` stamped with the current time.
    pub fn get_state() -> Self {
        Self::Command(ClientCommand::GetState {
            timestamp: now_millis(),
        })
    }

    /// Short label for logs.
    pub fn label(&self) -> &str {
        match self {
            Self::Command(ClientCommand::UserMessage { .. }) => "user_message",
            Self::Command(ClientCommand::Ping { .. }) => "ping",
            Self::Command(ClientCommand::GetState { .. }) => "get_state",
            Self::Json(value) => value.get("type").and_then(Value::as_str).unwrap_or("json"),
            Self::Text(_) => "text",
        }
    }

    /// Encode into a text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Command(cmd) => serde_json::to_string(cmd),
            Self::Json(value) => serde_json::to_string(value),
            Self::Text(text) => Ok(text.clone()),
        }
    }
}

impl From<ClientCommand> for OutboundMessage {
    fn from(cmd: ClientCommand) -> Self {
        Self::Command(cmd)
    }
}

impl From<Value> for OutboundMessage {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for OutboundMessage {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for OutboundMessage {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_wire_shape() {
        let frame = OutboundMessage::Command(ClientCommand::UserMessage {
            content: "hello".into(),
            timestamp: 7,
        })
        .encode()
        .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value, json!({"type": "user_message", "content": "hello", "timestamp": 7}));
    }

    #[test]
    fn ping_and_get_state_are_stamped() {
        let before = now_millis();
        let value: Value = serde_json::from_str(&OutboundMessage::ping().encode().unwrap()).unwrap();
        assert_eq!(value["type"], "ping");
        assert!(value["timestamp"].as_i64().unwrap() >= before);

        let value: Value =
            serde_json::from_str(&OutboundMessage::get_state().encode().unwrap()).unwrap();
        assert_eq!(value["type"], "get_state");
    }

    #[test]
    fn text_passes_through() {
        let msg = OutboundMessage::from("{\"type\":\"custom\"}");
        assert_eq!(msg.encode().unwrap(), "{\"type\":\"custom\"}");
        assert_eq!(msg.label(), "text");
    }

    #[test]
    fn json_label_uses_type_field() {
        assert_eq!(OutboundMessage::from(json!({"type": "hello"})).label(), "hello");
        assert_eq!(OutboundMessage::from(json!([1, 2])).label(), "json");
    }
}
