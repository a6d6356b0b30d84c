//! AG-UI protocol events.
//!
//! Inbound frames are JSON objects with a `type` discriminator holding the
//! SCREAMING_SNAKE_CASE event kind (`event_type` is accepted as an alias by
//! the router). Payload fields are snake_case.
//!
//! [`EventKind`] is the closed set of recognized kinds. Anything else is an
//! opaque message and never reaches this enum.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MessageId, RunId, StepId, ToolCallId};
use crate::messages::MessageRecord;

// ─────────────────────────────────────────────────────────────────────────────
// EventKind
// ─────────────────────────────────────────────────────────────────────────────

/// Recognized event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Full state replacement.
    StateSnapshot,
    /// Partial state update.
    StateDelta,
    /// Full message list replacement.
    MessagesSnapshot,
    /// Tool call began.
    ToolCallStart,
    /// Streamed tool arguments.
    ToolCallArgs,
    /// Combined tool call fragment.
    ToolCallChunk,
    /// Tool call finished.
    ToolCallEnd,
    /// Text message began.
    TextMessageStart,
    /// Text message content chunk.
    TextMessageContent,
    /// Combined text message fragment.
    TextMessageChunk,
    /// Text message finished.
    TextMessageEnd,
    /// Step began.
    StepStarted,
    /// Step finished.
    StepFinished,
    /// Run began.
    RunStarted,
    /// Run finished.
    RunFinished,
    /// Run failed.
    RunError,
    /// Application-defined event.
    Custom,
    /// Pass-through payload.
    Raw,
}

impl EventKind {
    /// Every recognized kind.
    pub const ALL: [EventKind; 18] = [
        Self::StateSnapshot,
        Self::StateDelta,
        Self::MessagesSnapshot,
        Self::ToolCallStart,
        Self::ToolCallArgs,
        Self::ToolCallChunk,
        Self::ToolCallEnd,
        Self::TextMessageStart,
        Self::TextMessageContent,
        Self::TextMessageChunk,
        Self::TextMessageEnd,
        Self::StepStarted,
        Self::StepFinished,
        Self::RunStarted,
        Self::RunFinished,
        Self::RunError,
        Self::Custom,
        Self::Raw,
    ];

    /// Wire name (`TOOL_CALL_START`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateSnapshot => "STATE_SNAPSHOT",
            Self::StateDelta => "STATE_DELTA",
            Self::MessagesSnapshot => "MESSAGES_SNAPSHOT",
            Self::ToolCallStart => "TOOL_CALL_START",
            Self::ToolCallArgs => "TOOL_CALL_ARGS",
            Self::ToolCallChunk => "TOOL_CALL_CHUNK",
            Self::ToolCallEnd => "TOOL_CALL_END",
            Self::TextMessageStart => "TEXT_MESSAGE_START",
            Self::TextMessageContent => "TEXT_MESSAGE_CONTENT",
            Self::TextMessageChunk => "TEXT_MESSAGE_CHUNK",
            Self::TextMessageEnd => "TEXT_MESSAGE_END",
            Self::StepStarted => "STEP_STARTED",
            Self::StepFinished => "STEP_FINISHED",
            Self::RunStarted => "RUN_STARTED",
            Self::RunFinished => "RUN_FINISHED",
            Self::RunError => "RUN_ERROR",
            Self::Custom => "CUSTOM",
            Self::Raw => "RAW",
        }
    }

    /// Look up a kind by wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    /// Accepts the wire name in any case (`tool_call_start` works too).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(&s.to_ascii_uppercase()).ok_or_else(|| format!("unknown event kind: {s}"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AguiEvent
// ─────────────────────────────────────────────────────────────────────────────

/// A decoded protocol event payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AguiEvent {
    /// Replace the shared state (cards live under `state.cards`).
    StateSnapshot {
        /// New state object.
        #[serde(default)]
        state: Value,
    },

    /// Shallow-merge into the shared state.
    StateDelta {
        /// Keys to overwrite.
        #[serde(default)]
        delta: Value,
    },

    /// Replace the message list.
    MessagesSnapshot {
        /// Messages in display order.
        #[serde(default)]
        messages: Vec<MessageRecord>,
    },

    /// A tool call started.
    ToolCallStart {
        /// Tool call ID (also the card ID).
        call_id: ToolCallId,
        /// Tool name.
        #[serde(default)]
        tool_name: String,
        /// Call arguments.
        #[serde(default)]
        arguments: Value,
    },

    /// Streamed fragment of tool arguments.
    ToolCallArgs {
        /// Tool call ID.
        call_id: ToolCallId,
        /// Argument text fragment.
        #[serde(default)]
        delta: String,
    },

    /// Combined tool call fragment.
    ToolCallChunk {
        /// Tool call ID.
        call_id: ToolCallId,
        /// Tool name, present on the first chunk.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
        /// Argument text fragment.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<String>,
    },

    /// A tool call finished.
    ToolCallEnd {
        /// Tool call ID.
        call_id: ToolCallId,
        /// Tool result.
        #[serde(default)]
        result: Value,
        /// Explicit success flag.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        success: Option<bool>,
        /// Explicit failure description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A text message started.
    TextMessageStart {
        /// Message ID.
        message_id: MessageId,
        /// Author role; defaults to `assistant`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        /// Inline content some servers attach to the start frame.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// A chunk of message content.
    TextMessageContent {
        /// Message ID.
        message_id: MessageId,
        /// Text to append.
        #[serde(default)]
        content: String,
    },

    /// Start-if-needed plus content in one frame.
    TextMessageChunk {
        /// Message ID.
        message_id: MessageId,
        /// Author role.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        /// Text to append.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// A text message finished.
    TextMessageEnd {
        /// Message ID.
        message_id: MessageId,
    },

    /// A step started.
    StepStarted {
        /// Step ID.
        step_id: StepId,
        /// Step name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step_name: Option<String>,
        /// Step description.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    /// A step finished. A missing `success` flag counts as failure.
    StepFinished {
        /// Step ID.
        step_id: StepId,
        /// Whether the step succeeded.
        #[serde(default)]
        success: bool,
        /// Step result.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },

    /// The agent run started.
    RunStarted {
        /// Run ID.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
    },

    /// The agent run finished.
    RunFinished {
        /// Run ID.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
    },

    /// The agent run failed.
    RunError {
        /// Run ID.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        /// Failure description.
        #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Application-defined event.
    Custom {
        /// Optional event name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        /// Event data.
        #[serde(default, alias = "value")]
        data: Value,
    },

    /// Pass-through payload.
    Raw {
        /// Raw payload.
        #[serde(default, alias = "event")]
        payload: Value,
    },
}

impl AguiEvent {
    /// The kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateSnapshot { .. } => EventKind::StateSnapshot,
            Self::StateDelta { .. } => EventKind::StateDelta,
            Self::MessagesSnapshot { .. } => EventKind::MessagesSnapshot,
            Self::ToolCallStart { .. } => EventKind::ToolCallStart,
            Self::ToolCallArgs { .. } => EventKind::ToolCallArgs,
            Self::ToolCallChunk { .. } => EventKind::ToolCallChunk,
            Self::ToolCallEnd { .. } => EventKind::ToolCallEnd,
            Self::TextMessageStart { .. } => EventKind::TextMessageStart,
            Self::TextMessageContent { .. } => EventKind::TextMessageContent,
            Self::TextMessageChunk { .. } => EventKind::TextMessageChunk,
            Self::TextMessageEnd { .. } => EventKind::TextMessageEnd,
            Self::StepStarted { .. } => EventKind::StepStarted,
            Self::StepFinished { .. } => EventKind::StepFinished,
            Self::RunStarted { .. } => EventKind::RunStarted,
            Self::RunFinished { .. } => EventKind::RunFinished,
            Self::RunError { .. } => EventKind::RunError,
            Self::Custom { .. } => EventKind::Custom,
            Self::Raw { .. } => EventKind::Raw,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event envelope
// ─────────────────────────────────────────────────────────────────────────────

/// A received event with its frame timestamp.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    /// Timestamp from the frame, verbatim (server units).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    /// The decoded payload.
    #[serde(flatten)]
    pub payload: AguiEvent,
}

impl Event {
    /// Wrap a payload without a timestamp.
    pub fn new(payload: AguiEvent) -> Self {
        Self {
            timestamp: None,
            payload,
        }
    }

    /// Attach a frame timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The kind of the wrapped payload.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

impl From<AguiEvent> for Event {
    fn from(payload: AguiEvent) -> Self {
        Self::new(payload)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
