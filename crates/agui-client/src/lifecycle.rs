//! Connection status and lifecycle notifications.

use std::fmt;
use std::time::Duration;

use agui_core::errors::ClientError;
use agui_state::LogEntry;

/// Connection state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// No transport and no open in flight.
    #[default]
    Disconnected,
    /// An open is in flight.
    Connecting,
    /// Transport open.
    Connected,
}

impl ConnectionStatus {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broadcast to every [`AguiClient::subscribe`](crate::AguiClient::subscribe) receiver.
#[derive(Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    /// The transport opened.
    Connected,
    /// The transport closed (manually or not).
    Disconnected,
    /// A reconnect is scheduled.
    Reconnecting {
        /// 1-based attempt number.
        attempt: u32,
        /// Configured maximum.
        max_attempts: u32,
        /// Wait before the attempt.
        delay: Duration,
    },
    /// Every reconnect attempt failed; nothing more happens until `connect()`.
    ReconnectFailed {
        /// Attempts made.
        attempts: u32,
    },
    /// A transport, protocol or handler failure.
    Error(ClientError),
    /// An entry was appended to the event log.
    EventLogged(LogEntry),
}

impl LifecycleEvent {
    /// Short name, as used for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::ReconnectFailed { .. } => "reconnect_failed",
            Self::Error(_) => "error",
            Self::EventLogged(_) => "event_logged",
        }
    }
}
