//! Error hierarchy for the AG-UI card client.
//!
//! Built on [`thiserror`]:
//!
//! - [`TransportError`]: connection open/send/close failures (retryable via backoff)
//! - [`ProtocolError`]: a single malformed or unusable frame (frame dropped, never fatal)
//! - [`HandlerError`]: a registered handler failed (caught at the dispatch boundary)
//! - [`StateError`]: a requested card transition is not allowed
//! - [`ClientError`]: top-level umbrella with `error_kind()` classification
//!
//! All types are `Clone` so they can ride on lifecycle broadcast channels.

use thiserror::Error;

use crate::cards::CardStatus;
use crate::ids::CardId;

// ─────────────────────────────────────────────────────────────────────────────
// TransportError
// ─────────────────────────────────────────────────────────────────────────────

/// Connection-level failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport could not be opened.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectFailed {
        /// Endpoint URL we tried to open.
        endpoint: String,
        /// Why the open failed.
        reason: String,
    },

    /// A frame could not be written to the transport.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The transport closed without a manual disconnect.
    #[error("connection closed: {0}")]
    Closed(String),

    /// No activity was observed within the pong timeout.
    #[error("no pong within {timeout_ms}ms")]
    HeartbeatTimeout {
        /// Configured pong timeout.
        timeout_ms: u64,
    },

    /// All reconnect attempts were used up.
    #[error("gave up after {attempts} reconnect attempts")]
    ReconnectExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

impl TransportError {
    /// Whether the backoff policy should try again after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ReconnectExhausted { .. })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ProtocolError
// ─────────────────────────────────────────────────────────────────────────────

/// A frame that could not be turned into an event.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The frame is JSON but has no `type` / `event_type` discriminator.
    #[error("frame has no event kind")]
    MissingKind,

    /// The kind is recognized but the payload does not match its shape.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Wire name of the event kind.
        kind: String,
        /// Deserialization failure.
        reason: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// HandlerError
// ─────────────────────────────────────────────────────────────────────────────

/// A registered event handler failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("handler for {kind} failed: {message}")]
pub struct HandlerError {
    /// Event kind (or opaque message type) being handled.
    pub kind: String,
    /// Failure description.
    pub message: String,
}

impl HandlerError {
    /// Create a handler error.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StateError
// ─────────────────────────────────────────────────────────────────────────────

/// Card state errors.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StateError {
    /// No card with this ID.
    #[error("card not found: {0}")]
    CardNotFound(CardId),

    /// The status machine forbids this transition.
    #[error("card {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Card being changed.
        id: CardId,
        /// Current status.
        from: CardStatus,
        /// Requested status.
        to: CardStatus,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// ClientError
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for the client.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Transport failure.
    #[error("{0}")]
    Transport(#[from] TransportError),
    /// Protocol failure.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),
    /// Handler failure.
    #[error("{0}")]
    Handler(#[from] HandlerError),
    /// Card state failure.
    #[error("{0}")]
    State(#[from] StateError),
    /// The client has been shut down.
    #[error("client is shut down")]
    Shutdown,
}

impl ClientError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol",
            Self::Handler(_) => "handler",
            Self::State(_) => "state",
            Self::Shutdown => "shutdown",
        }
    }

    /// Whether the connection manager will retry on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
