//! Bounded, append-only event log.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default number of entries kept.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// What a log entry is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    /// A decoded protocol event.
    Event,
    /// An opaque server message (`pong`, ...).
    Message,
    /// Connection lifecycle change.
    Connection,
    /// A frame sent (or queued) by the client.
    Outbound,
    /// A card changed through a client action.
    Card,
    /// A protocol, transport or handler failure.
    Error,
}

impl LogCategory {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Message => "message",
            Self::Connection => "connection",
            Self::Outbound => "outbound",
            Self::Card => "card",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 time the entry was recorded.
    pub timestamp: String,
    /// Entry category.
    pub category: LogCategory,
    /// Associated payload.
    pub payload: Value,
}

/// Keeps the most recent `capacity` entries, oldest evicted first.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl EventLog {
    /// A log holding at most `capacity` entries (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry stamped with the current time. Returns a copy of it.
    pub fn record(&mut self, category: LogCategory, payload: Value) -> LogEntry {
        let entry = LogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            category,
            payload,
        };
        if self.entries.len() == self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }

    /// Copy of every entry, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            let _ = log.record(LogCategory::Event, json!(i));
        }
        let payloads: Vec<_> = log.entries().into_iter().map(|e| e.payload).collect();
        assert_eq!(payloads, vec![json!(2), json!(3), json!(4)]);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn default_capacity_is_100() {
        let mut log = EventLog::default();
        for i in 0..150 {
            let _ = log.record(LogCategory::Message, json!(i));
        }
        assert_eq!(log.len(), 100);
        assert_eq!(log.entries()[0].payload, json!(50));
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let mut log = EventLog::new(1);
        let entry = log.record(LogCategory::Connection, json!("connected"));
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());
        assert_eq!(log.entries(), vec![entry]);
    }

    #[test]
    fn clear_empties_log() {
        let mut log = EventLog::new(0);
        assert_eq!(log.capacity(), 1);
        let _ = log.record(LogCategory::Error, Value::Null);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn entries_are_copies() {
        let mut log = EventLog::new(5);
        let _ = log.record(LogCategory::Outbound, json!({"type": "ping"}));
        let mut copy = log.entries();
        copy.clear();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn category_serializes_lowercase() {
        assert_eq!(serde_json::to_value(LogCategory::Outbound).unwrap(), json!("outbound"));
    }
}
