//! Streamed text messages.

use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

/// Content substituted when a message ends without any text.
pub const EMPTY_MESSAGE_CONTENT: &str = "(no content)";
/// Role assumed when a start event omits one.
pub const DEFAULT_ROLE: &str = "assistant";

fn default_role() -> String {
    DEFAULT_ROLE.to_owned()
}

/// One text message, possibly still streaming.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Message ID.
    pub id: MessageId,
    /// Author role (`assistant`, `user`, ...).
    #[serde(default = "default_role")]
    pub role: String,
    /// Accumulated content.
    #[serde(default)]
    pub content: String,
    /// True strictly between start and end.
    #[serde(default)]
    pub streaming: bool,
    /// Timestamp of the start frame in server units, verbatim. Falls back to
    /// the receive time in epoch milliseconds when the frame carries none.
    #[serde(default)]
    pub timestamp: f64,
}

impl MessageRecord {
    /// A fresh streaming record with empty content.
    pub fn started(id: MessageId, role: impl Into<String>, timestamp: f64) -> Self {
        Self {
            id,
            role: role.into(),
            content: String::new(),
            streaming: true,
            timestamp,
        }
    }
}
