//! Cards: the UI-facing unit of agent work.
//!
//! A [`CardRecord`] is a fully-populated card. A [`CardPatch`] is the partial
//! form carried by `STATE_SNAPSHOT` / `STATE_DELTA` payloads; missing fields
//! are filled from defaults on insert and left untouched on merge.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::ids::CardId;

/// Title used when a card arrives without one.
pub const DEFAULT_TITLE: &str = "Unknown title";
/// Upper bound for card progress.
pub const MAX_PROGRESS: u8 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// CardStatus
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a card.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    /// Created, not started.
    #[default]
    Pending,
    /// Work in progress.
    Executing,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Error,
    /// Stopped by an explicit cancel action.
    Cancelled,
}

impl CardStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed, Error and Cancelled end a lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }

    /// Event-driven transition table.
    ///
    /// Starting (`Executing`) is always allowed: on a terminal card it begins a
    /// fresh lifecycle. `Cancelled` is only reachable from `Executing`.
    pub fn can_transition_to(self, next: CardStatus) -> bool {
        match (self, next) {
            (_, Self::Executing) => true,
            (Self::Pending | Self::Executing, Self::Completed | Self::Error) => true,
            (Self::Executing, Self::Cancelled) => true,
            (from, Self::Pending) => from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CardType
// ─────────────────────────────────────────────────────────────────────────────

/// Open tag set describing what a card represents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CardType {
    /// Generic task.
    Task,
    /// Tool invocation.
    ToolCall,
    /// Streamed text message.
    Message,
    /// Agent step.
    Step,
    /// Analysis output.
    Analysis,
    /// State display.
    State,
    /// Not specified.
    #[default]
    Unknown,
    /// Any other tag, preserved verbatim.
    Other(String),
}

impl CardType {
    /// Wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Task => "task",
            Self::ToolCall => "tool_call",
            Self::Message => "message",
            Self::Step => "step",
            Self::Analysis => "analysis",
            Self::State => "state",
            Self::Unknown => "unknown",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for CardType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "task" => Self::Task,
            "tool_call" => Self::ToolCall,
            "message" => Self::Message,
            "step" => Self::Step,
            "analysis" => Self::Analysis,
            "state" => Self::State,
            "unknown" | "" => Self::Unknown,
            _ => Self::Other(tag),
        }
    }
}

impl From<CardType> for String {
    fn from(ty: CardType) -> Self {
        match ty {
            CardType::Other(tag) => tag,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress
// ─────────────────────────────────────────────────────────────────────────────

/// Clamp an arbitrary numeric progress value into `[0, 100]`.
///
/// Fractions are rounded, NaN becomes 0.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, f64::from(MAX_PROGRESS)) as u8
}

// ─────────────────────────────────────────────────────────────────────────────
// CardRecord
// ─────────────────────────────────────────────────────────────────────────────

/// A fully-populated card.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CardRecord {
    /// Unique, stable key.
    pub id: CardId,
    /// Display title.
    pub title: String,
    /// Freeform body text.
    pub content: String,
    /// Lifecycle status.
    pub status: CardStatus,
    /// Card category tag.
    #[serde(rename = "type")]
    pub card_type: CardType,
    /// Human-readable creation/update time.
    pub timestamp: String,
    /// Completion percentage, always in `[0, 100]`.
    pub progress: u8,
    /// Opaque metadata, never interpreted by the core.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CardRecord {
    /// A new card with every field at its default.
    pub fn new(id: CardId) -> Self {
        Self {
            id,
            title: DEFAULT_TITLE.to_owned(),
            content: String::new(),
            status: CardStatus::Pending,
            card_type: CardType::Unknown,
            timestamp: crate::display_time(),
            progress: 0,
            metadata: Map::new(),
        }
    }

    /// Build a card from a partial record, filling the gaps with defaults.
    pub fn from_patch(id: CardId, patch: &CardPatch) -> Self {
        Self::new(id).merged(patch)
    }

    /// Shallow field-wise merge: every field present in `patch` wins.
    #[must_use]
    pub fn merged(&self, patch: &CardPatch) -> Self {
        let mut next = self.clone();
        if let Some(title) = &patch.title {
            next.title.clone_from(title);
        }
        if let Some(content) = &patch.content {
            next.content.clone_from(content);
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        if let Some(card_type) = &patch.card_type {
            next.card_type = card_type.clone();
        }
        if let Some(timestamp) = &patch.timestamp {
            next.timestamp.clone_from(timestamp);
        }
        if let Some(progress) = patch.progress {
            next.progress = clamp_progress(progress);
        }
        if let Some(metadata) = &patch.metadata {
            next.metadata.clone_from(metadata);
        }
        next
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CardPatch
// ─────────────────────────────────────────────────────────────────────────────

/// Partial card as sent by the server. Absent fields are `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardPatch {
    /// Display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Body text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CardStatus>,
    /// Category tag.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub card_type: Option<CardType>,
    /// Timestamp; numbers are accepted and kept as their decimal text.
    #[serde(
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    /// Raw progress; clamped when applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Replacement metadata map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

impl CardPatch {
    /// Parse a JSON object of `id -> partial card` entries.
    ///
    /// Entries that do not parse as a card are skipped and returned separately
    /// as `(id, reason)` so the caller can log them.
    pub fn parse_map(cards: &Map<String, Value>) -> (Vec<(CardId, CardPatch)>, Vec<(String, String)>) {
        let mut patches = Vec::with_capacity(cards.len());
        let mut rejected = Vec::new();
        for (id, value) in cards {
            match CardPatch::deserialize(value) {
                Ok(patch) => patches.push((CardId::from(id.as_str()), patch)),
                Err(e) => rejected.push((id.clone(), e.to_string())),
            }
        }
        (patches, rejected)
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
