//! Branded ID newtypes for type safety.
//!
//! Card, message, step and tool-call identifiers all travel as plain strings
//! on the wire. Wrapping each in its own newtype keeps a step ID from being
//! used where a card ID is expected.
//!
//! Server-assigned IDs are taken verbatim. Client-generated IDs (connections)
//! are UUID v7 (time-ordered) generated via [`uuid::Uuid::now_v7`].

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix for card IDs derived from step IDs.
pub const STEP_CARD_PREFIX: &str = "step_";
/// Prefix for companion card IDs derived from message IDs.
pub const MESSAGE_CARD_PREFIX: &str = "msg_";

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Key of a card in the card store.
    CardId
}

branded_id! {
    /// Identifier of a streamed text message.
    MessageId
}

branded_id! {
    /// Identifier of a tool call. Tool call cards share this ID.
    ToolCallId
}

branded_id! {
    /// Identifier of an agent step.
    StepId
}

branded_id! {
    /// Identifier of an agent run.
    RunId
}

branded_id! {
    /// Identifier of one transport connection (client-generated).
    ConnectionId
}

impl ConnectionId {
    /// Create a new random connection ID (`conn_<uuid v7>`).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl CardId {
    /// Card ID for a step. Steps live in their own namespace so a step and a
    /// tool call sharing a raw ID never collide.
    #[must_use]
    pub fn for_step(step_id: &StepId) -> Self {
        Self(format!("{STEP_CARD_PREFIX}{step_id}"))
    }

    /// Companion card ID for a streamed message.
    #[must_use]
    pub fn for_message(message_id: &MessageId) -> Self {
        Self(format!("{MESSAGE_CARD_PREFIX}{message_id}"))
    }

    /// Card ID for a tool call (same raw value).
    #[must_use]
    pub fn for_tool_call(call_id: &ToolCallId) -> Self {
        Self(call_id.as_str().to_owned())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
