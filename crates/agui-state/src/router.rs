//! Frame decoding and handler dispatch.
//!
//! [`decode_frame`] turns a text frame into either a typed [`Event`] or an
//! [`OpaqueMessage`] (a server message whose `type` is not an AG-UI event
//! kind, such as `pong`). A bad frame is an error for that frame only.
//!
//! [`EventRouter`] keeps handler registrations. Dispatch clones the matching
//! handlers out of the registry and calls them with no lock held, so a
//! handler may register or remove handlers itself. A handler that returns an
//! error or panics is logged and reported; the remaining handlers still run.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use agui_core::errors::{HandlerError, ProtocolError};
use agui_core::events::{AguiEvent, Event, EventKind};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, warn};

/// Server replies that are expected and not worth a warning.
const KNOWN_REPLIES: &[&str] = &["pong"];

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

/// A server message that is not an AG-UI event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpaqueMessage {
    /// Value of the `type` field.
    #[serde(rename = "type")]
    pub kind: String,
    /// The whole frame.
    pub payload: Value,
}

/// Result of decoding one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// A recognized protocol event.
    Event(Event),
    /// Any other typed message.
    Opaque(OpaqueMessage),
}

/// Decode a text frame.
pub fn decode_frame(text: &str) -> Result<Decoded, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
    decode_value(value)
}

/// Decode an already-parsed frame.
pub fn decode_value(value: Value) -> Result<Decoded, ProtocolError> {
    let Value::Object(mut map) = value else {
        return Err(ProtocolError::MalformedFrame(
            "frame is not a JSON object".into(),
        ));
    };

    let kind = ["type", "event_type"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
        .ok_or(ProtocolError::MissingKind)?;

    let Some(event_kind) = EventKind::from_wire(&kind) else {
        if KNOWN_REPLIES.contains(&kind.as_str()) {
            debug!(message_type = %kind, "received server reply");
        } else {
            warn!(message_type = %kind, "unrecognized message type, keeping as opaque");
        }
        return Ok(Decoded::Opaque(OpaqueMessage {
            kind,
            payload: Value::Object(map),
        }));
    };

    let timestamp = map.get("timestamp").and_then(Value::as_f64);
    let _ = map.remove("event_type");
    let _ = map.insert("type".to_owned(), Value::String(kind));

    let payload: AguiEvent =
        serde_json::from_value(Value::Object(map)).map_err(|e| ProtocolError::InvalidPayload {
            kind: event_kind.as_str().to_owned(),
            reason: e.to_string(),
        })?;

    Ok(Decoded::Event(Event { timestamp, payload }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Handle returned by every registration; pass it to [`EventRouter::off`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Callback for decoded events.
pub type EventHandler = Arc<dyn Fn(&Event) -> Result<(), HandlerError> + Send + Sync>;
/// Callback for opaque messages.
pub type MessageHandler = Arc<dyn Fn(&OpaqueMessage) -> Result<(), HandlerError> + Send + Sync>;

/// Outcome of one dispatch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispatchReport {
    /// Handlers called.
    pub invoked: usize,
    /// Handlers that failed, in call order.
    pub failures: Vec<(HandlerId, HandlerError)>,
}

impl DispatchReport {
    /// Whether every handler succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
struct Registry {
    by_kind: Vec<(HandlerId, EventKind, EventHandler)>,
    any: Vec<(HandlerId, EventHandler)>,
    messages: Vec<(HandlerId, String, MessageHandler)>,
}

/// Handler registry and dispatcher.
#[derive(Default)]
pub struct EventRouter {
    registry: RwLock<Registry>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reg = self.registry.read();
        f.debug_struct("EventRouter")
            .field("by_kind", &reg.by_kind.len())
            .field("any", &reg.any.len())
            .field("messages", &reg.messages.len())
            .finish()
    }
}

impl EventRouter {
    /// An empty router.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> HandlerId {
        HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a handler for one event kind.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.registry
            .write()
            .by_kind
            .push((id, kind, Arc::new(handler)));
        id
    }

    /// Register an observer for every decoded event.
    pub fn on_any<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.registry.write().any.push((id, Arc::new(handler)));
        id
    }

    /// Register a handler for opaque messages of one `type`.
    pub fn on_message<F>(&self, message_type: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&OpaqueMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.registry
            .write()
            .messages
            .push((id, message_type.into(), Arc::new(handler)));
        id
    }

    /// Remove a registration. Returns whether it existed.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut reg = self.registry.write();
        let before = reg.by_kind.len() + reg.any.len() + reg.messages.len();
        reg.by_kind.retain(|(h, _, _)| *h != id);
        reg.any.retain(|(h, _)| *h != id);
        reg.messages.retain(|(h, _, _)| *h != id);
        before != reg.by_kind.len() + reg.any.len() + reg.messages.len()
    }

    /// Number of registrations.
    pub fn handler_count(&self) -> usize {
        let reg = self.registry.read();
        reg.by_kind.len() + reg.any.len() + reg.messages.len()
    }

    /// Call kind handlers, then "any" observers, each in registration order.
    pub fn dispatch_event(&self, event: &Event) -> DispatchReport {
        let kind = event.kind();
        let handlers: Vec<(HandlerId, EventHandler)> = {
            let reg = self.registry.read();
            reg.by_kind
                .iter()
                .filter(|(_, k, _)| *k == kind)
                .map(|(id, _, h)| (*id, Arc::clone(h)))
                .chain(reg.any.iter().map(|(id, h)| (*id, Arc::clone(h))))
                .collect()
        };

        let mut report = DispatchReport::default();
        for (id, handler) in handlers {
            report.invoked += 1;
            if let Err(err) = invoke(kind.as_str(), || handler(event)) {
                error!(event_kind = %kind, handler = %id, error = %err, "event handler failed");
                report.failures.push((id, err));
            }
        }
        report
    }

    /// Call handlers registered for this message's `type`.
    pub fn dispatch_message(&self, message: &OpaqueMessage) -> DispatchReport {
        let handlers: Vec<(HandlerId, MessageHandler)> = {
            let reg = self.registry.read();
            reg.messages
                .iter()
                .filter(|(_, t, _)| *t == message.kind)
                .map(|(id, _, h)| (*id, Arc::clone(h)))
                .collect()
        };

        let mut report = DispatchReport::default();
        for (id, handler) in handlers {
            report.invoked += 1;
            if let Err(err) = invoke(&message.kind, || handler(message)) {
                error!(message_type = %message.kind, handler = %id, error = %err, "message handler failed");
                report.failures.push((id, err));
            }
        }
        report
    }
}

/// Run one handler, turning a panic into a [`HandlerError`].
fn invoke(kind: &str, f: impl FnOnce() -> Result<(), HandlerError>) -> Result<(), HandlerError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::new(
            kind,
            format!("handler panicked: {}", panic_message(panic.as_ref())),
        )),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use agui_core::ids::{MessageId, ToolCallId};
    use agui_core::logging::capture_logs;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use serde_json::json;
    use tracing::Level;

    fn event(payload: AguiEvent) -> Event {
        Event::new(payload)
    }

    fn content_event() -> Event {
        event(AguiEvent::TextMessageContent {
            message_id: MessageId::from("m1"),
            content: "x".into(),
        })
    }

    // ── decode ──────────────────────────────────────────────────────────

    #[test]
    fn decode_recognized_event() {
        let decoded = decode_frame(
            r#"{"type":"TOOL_CALL_START","call_id":"t1","tool_name":"search","arguments":{},"timestamp":1700000000123}"#,
        )
        .unwrap();
        assert_matches!(decoded, Decoded::Event(ev) => {
            assert_eq!(ev.kind(), EventKind::ToolCallStart);
            assert_eq!(ev.timestamp, Some(1_700_000_000_123.0));
            assert_matches!(ev.payload, AguiEvent::ToolCallStart { call_id, .. } if call_id == ToolCallId::from("t1"));
        });
    }

    #[test]
    fn decode_accepts_event_type_alias() {
        let decoded =
            decode_frame(r#"{"event_type":"TEXT_MESSAGE_END","message_id":"m1"}"#).unwrap();
        assert_matches!(decoded, Decoded::Event(ev) if ev.kind() == EventKind::TextMessageEnd);
    }

    #[test]
    fn decode_malformed_json() {
        assert_matches!(decode_frame("{not json"), Err(ProtocolError::MalformedFrame(_)));
        assert_matches!(decode_frame("[1,2]"), Err(ProtocolError::MalformedFrame(_)));
    }

    #[test]
    fn decode_missing_kind() {
        assert_matches!(decode_frame(r#"{"call_id":"t1"}"#), Err(ProtocolError::MissingKind));
        assert_matches!(decode_frame(r#"{"type":7}"#), Err(ProtocolError::MissingKind));
    }

    #[test]
    fn decode_invalid_payload() {
        assert_matches!(
            decode_frame(r#"{"type":"TOOL_CALL_END"}"#),
            Err(ProtocolError::InvalidPayload { kind, .. }) if kind == "TOOL_CALL_END"
        );
    }

    #[test]
    fn pong_is_opaque_and_quiet() {
        let (logs, _guard) = capture_logs();
        let decoded = decode_frame(r#"{"type":"pong","timestamp":5}"#).unwrap();
        assert_matches!(decoded, Decoded::Opaque(msg) if msg.kind == "pong");
        assert_eq!(logs.count_at_level(Level::WARN), 0);
    }

    #[test]
    fn unknown_type_is_opaque_with_warning() {
        let (logs, _guard) = capture_logs();
        let decoded = decode_frame(r#"{"type":"progress_tracker","value":3}"#).unwrap();
        assert_matches!(decoded, Decoded::Opaque(msg) => {
            assert_eq!(msg.payload["value"], 3);
        });
        assert!(logs.has_event(Level::WARN, "unrecognized message type"));
    }

    // ── dispatch ────────────────────────────────────────────────────────

    #[test]
    fn kind_handlers_run_before_any_observers_in_order() {
        let router = EventRouter::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let c = Arc::clone(&calls);
        let _ = router.on_any(move |_| {
            c.lock().push("any");
            Ok(())
        });
        let c = Arc::clone(&calls);
        let _ = router.on(EventKind::TextMessageContent, move |_| {
            c.lock().push("kind-1");
            Ok(())
        });
        let c = Arc::clone(&calls);
        let _ = router.on(EventKind::TextMessageContent, move |_| {
            c.lock().push("kind-2");
            Ok(())
        });
        let c = Arc::clone(&calls);
        let _ = router.on(EventKind::RunStarted, move |_| {
            c.lock().push("other");
            Ok(())
        });

        let report = router.dispatch_event(&content_event());
        assert_eq!(report.invoked, 3);
        assert!(report.is_clean());
        assert_eq!(*calls.lock(), vec!["kind-1", "kind-2", "any"]);
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_stop_dispatch() {
        let router = EventRouter::new();
        let reached = Arc::new(Mutex::new(false));

        let bad = router.on(EventKind::TextMessageContent, |_| {
            Err(HandlerError::new("TEXT_MESSAGE_CONTENT", "nope"))
        });
        let boom = router.on(EventKind::TextMessageContent, |_| panic!("kaboom"));
        let r = Arc::clone(&reached);
        let _ = router.on_any(move |_| {
            *r.lock() = true;
            Ok(())
        });

        let report = router.dispatch_event(&content_event());
        assert_eq!(report.invoked, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].0, bad);
        assert_eq!(report.failures[1].0, boom);
        assert!(report.failures[1].1.message.contains("kaboom"));
        assert!(*reached.lock());
    }

    #[test]
    fn off_removes_registration() {
        let router = EventRouter::new();
        let id = router.on_any(|_| Ok(()));
        let msg = router.on_message("pong", |_| Ok(()));
        assert_eq!(router.handler_count(), 2);
        assert!(router.off(id));
        assert!(!router.off(id));
        assert!(router.off(msg));
        assert_eq!(router.dispatch_event(&content_event()).invoked, 0);
    }

    #[test]
    fn message_handlers_match_on_type() {
        let router = EventRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _ = router.on_message("pong", move |m| {
            s.lock().push(m.payload["timestamp"].clone());
            Ok(())
        });

        let pong = OpaqueMessage {
            kind: "pong".into(),
            payload: json!({"type": "pong", "timestamp": 9}),
        };
        let other = OpaqueMessage {
            kind: "hello".into(),
            payload: json!({}),
        };
        assert_eq!(router.dispatch_message(&pong).invoked, 1);
        assert_eq!(router.dispatch_message(&other).invoked, 0);
        assert_eq!(*seen.lock(), vec![json!(9)]);
    }

    #[test]
    fn handler_may_register_during_dispatch() {
        let router = Arc::new(EventRouter::new());
        let r = Arc::clone(&router);
        let _ = router.on_any(move |_| {
            let _ = r.on_any(|_| Ok(()));
            Ok(())
        });
        let _ = router.dispatch_event(&content_event());
        assert_eq!(router.handler_count(), 2);
    }

    #[test]
    fn messages_snapshot_with_fractional_timestamps_decodes() {
        let frame = r#"{"type":"MESSAGES_SNAPSHOT","timestamp":1700000000.5,
            "messages":[{"id":"m1","role":"user","content":"hi","timestamp":1700000000.25}]}"#;
        let decoded = decode_frame(frame).unwrap();
        assert_matches!(
            decoded,
            Decoded::Event(Event { payload: AguiEvent::MessagesSnapshot { messages }, .. })
                if messages.len() == 1
                    && messages[0].id == MessageId::from("m1")
                    && (messages[0].timestamp - 1_700_000_000.25).abs() < 1e-6
        );
    }
}
