//! Client settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Connection, retry, heartbeat and buffering settings for the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// WebSocket path on the server.
    pub path: String,
    /// Reconnect automatically after an unexpected close.
    pub auto_reconnect: bool,
    /// Delay before the first reconnect attempt, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Attempts before giving up until the next manual connect.
    pub max_reconnect_attempts: u32,
    /// Growth factor applied to the delay on each further attempt.
    pub reconnect_multiplier: f64,
    /// Interval between `ping` frames while connected, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which the connection is treated as dead; 0 disables.
    pub pong_timeout_ms: u64,
    /// Outbound messages kept while offline; the oldest is dropped beyond this.
    pub max_queued_messages: usize,
    /// Entries kept in the event log.
    pub event_log_capacity: usize,
    /// How long content for a not-yet-started message is buffered, in milliseconds.
    pub pending_chunk_ttl_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8000,
            path: "/ws".to_string(),
            auto_reconnect: true,
            reconnect_interval_ms: 3000,
            max_reconnect_attempts: 5,
            reconnect_multiplier: 1.5,
            heartbeat_interval_ms: 30_000,
            pong_timeout_ms: 90_000,
            max_queued_messages: 1000,
            event_log_capacity: 100,
            pending_chunk_ttl_ms: 5000,
        }
    }
}

impl ClientSettings {
    /// WebSocket URL, e.g. `ws://localhost:8000/ws`.
    pub fn endpoint(&self) -> String {
        if self.path.starts_with('/') {
            format!("ws://{}:{}{}", self.host, self.port, self.path)
        } else {
            format!("ws://{}:{}/{}", self.host, self.port, self.path)
        }
    }

    /// Base reconnect delay.
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Heartbeat period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Pong timeout, `None` when liveness detection is disabled.
    pub fn pong_timeout(&self) -> Option<Duration> {
        (self.pong_timeout_ms > 0).then(|| Duration::from_millis(self.pong_timeout_ms))
    }

    /// Pending chunk TTL.
    pub fn pending_chunk_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_chunk_ttl_ms)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(SettingsError::InvalidValue("port must be non-zero".into()));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeatIntervalMs must be non-zero".into(),
            ));
        }
        if !self.reconnect_multiplier.is_finite() || self.reconnect_multiplier < 1.0 {
            return Err(SettingsError::InvalidValue(format!(
                "reconnectMultiplier must be >= 1.0, got {}",
                self.reconnect_multiplier
            )));
        }
        if self.event_log_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "eventLogCapacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
