//! [`AguiClient`]: the object applications hold.
//!
//! Construction spawns two tasks. The connection actor owns the transport;
//! the consumer drains its frame channel, applies each frame to the
//! [`StateEngine`], dispatches handlers and appends to the [`EventLog`].
//! Reads take a short lock and return owned snapshots.

use std::sync::Arc;

use agui_core::cards::CardRecord;
use agui_core::errors::{ClientError, HandlerError};
use agui_core::events::{Event, EventKind};
use agui_core::messages::MessageRecord;
use agui_core::outbound::OutboundMessage;
use agui_settings::{ClientSettings, SettingsError};
use agui_state::{
    AccumulatorConfig, Decoded, DispatchReport, EventLog, EventRouter, HandlerId, LogCategory,
    LogEntry, OpaqueMessage, RunStatus, StateEngine, decode_frame,
};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::connection::{ConnectionHandle, ConnectionManager, SendOutcome};
use crate::lifecycle::{ConnectionStatus, LifecycleEvent};
use crate::transport::{Connector, WsConnector};

/// Depth of the frame channel between the actor and the consumer.
const FRAME_BUFFER: usize = 1024;
/// Depth of the lifecycle broadcast.
const LIFECYCLE_BUFFER: usize = 256;

/// AG-UI client. Cheap to clone; every clone drives the same connection.
///
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct AguiClient {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ClientSettings,
    connection: ConnectionHandle,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    _cancel_on_drop: DropGuard,
}

/// State shared with the consumer task.
struct Shared {
    router: EventRouter,
    engine: RwLock<StateEngine>,
    log: Mutex<EventLog>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
}

impl std::fmt::Debug for AguiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AguiClient")
            .field("endpoint", &self.inner.settings.endpoint())
            .field("status", &self.inner.connection.status())
            .finish_non_exhaustive()
    }
}

impl AguiClient {
    /// Client over a real WebSocket.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::InvalidValue`] when `settings` fail
    /// [`ClientSettings::validate`].
    pub fn new(settings: ClientSettings) -> Result<Self, SettingsError> {
        Self::with_connector(settings, Arc::new(WsConnector::default()))
    }

    /// Client over any [`Connector`].
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_connector(
        settings: ClientSettings,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, SettingsError> {
        settings.validate()?;
        let (lifecycle, lifecycle_rx) = broadcast::channel(LIFECYCLE_BUFFER);
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_BUFFER);
        let shutdown = CancellationToken::new();

        let engine = StateEngine::new(AccumulatorConfig {
            pending_ttl: settings.pending_chunk_ttl(),
            ..AccumulatorConfig::default()
        });
        let shared = Arc::new(Shared {
            router: EventRouter::new(),
            engine: RwLock::new(engine),
            log: Mutex::new(EventLog::new(settings.event_log_capacity)),
            lifecycle: lifecycle.clone(),
        });

        let (connection, actor) = ConnectionManager::new(
            settings.clone(),
            connector,
            lifecycle,
            frames_tx,
            shutdown.clone(),
        )
        .spawn();
        let consumer = tokio::spawn(consume(
            Arc::clone(&shared),
            frames_rx,
            lifecycle_rx,
            shutdown.clone(),
        ));

        info!(endpoint = %settings.endpoint(), "client created");
        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                connection,
                shared,
                _cancel_on_drop: shutdown.clone().drop_guard(),
                shutdown,
                tasks: Mutex::new(vec![actor, consumer]),
            }),
        })
    }

    /// Settings this client was built with.
    pub fn settings(&self) -> &ClientSettings {
        &self.inner.settings
    }

    // ── Connection ──────────────────────────────────────────────────────

    /// Start connecting. The outcome arrives as a lifecycle event.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.connection.connect().await
    }

    /// Disconnect and stay disconnected until the next [`connect`](Self::connect).
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.inner.connection.disconnect().await
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    /// Observe status changes.
    pub fn watch_status(&self) -> tokio::sync::watch::Receiver<ConnectionStatus> {
        self.inner.connection.watch_status()
    }

    /// Lifecycle notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.shared.lifecycle.subscribe()
    }

    // ── Outbound ────────────────────────────────────────────────────────

    /// Send now, or queue until connected.
    pub async fn send(&self, message: impl Into<OutboundMessage>) -> SendOutcome {
        let message = message.into();
        let label = message.label().to_owned();
        let outcome = self.inner.connection.send(message).await;
        let outcome_name = match &outcome {
            SendOutcome::Sent => "sent",
            SendOutcome::Queued => "queued",
            SendOutcome::Failed(_) => "failed",
        };
        self.inner.shared.record(
            LogCategory::Outbound,
            json!({ "type": label, "outcome": outcome_name }),
        );
        outcome
    }

    /// Send a `user_message`.
    pub async fn send_user_message(&self, content: impl Into<String>) -> SendOutcome {
        self.send(OutboundMessage::user_message(content)).await
    }

    /// Ask the server for a fresh state snapshot.
    pub async fn request_state(&self) -> SendOutcome {
        self.send(OutboundMessage::get_state()).await
    }

    /// Send an application-level `ping`.
    pub async fn ping(&self) -> SendOutcome {
        self.send(OutboundMessage::ping()).await
    }

    // ── Handlers ────────────────────────────────────────────────────────

    /// Call `handler` for every event of `kind`.
    pub fn on_event<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.shared.router.on(kind, handler)
    }

    /// Call `handler` for every decoded event.
    pub fn on_any_event<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.shared.router.on_any(handler)
    }

    /// Call `handler` for non-event messages of `message_type`.
    pub fn on_message<F>(&self, message_type: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&OpaqueMessage) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.inner.shared.router.on_message(message_type, handler)
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.shared.router.off(id)
    }

    // ── State ───────────────────────────────────────────────────────────

    /// All cards, in insertion order.
    pub fn cards(&self) -> Vec<Arc<CardRecord>> {
        self.inner.shared.engine.read().store().get_all()
    }

    /// One card.
    pub fn card(&self, id: &str) -> Option<Arc<CardRecord>> {
        self.inner.shared.engine.read().store().get(id)
    }

    /// Cancel an executing card.
    pub fn cancel_card(&self, id: &str) -> Result<Arc<CardRecord>, ClientError> {
        let card = self.inner.shared.engine.write().store_mut().cancel(id)?;
        self.inner.shared.record(
            LogCategory::Card,
            json!({ "action": "cancel", "id": card.id }),
        );
        Ok(card)
    }

    /// All messages, in start order.
    pub fn messages(&self) -> Vec<MessageRecord> {
        self.inner.shared.engine.read().accumulator().messages()
    }

    /// The raw shared state object.
    pub fn shared_state(&self) -> Map<String, Value> {
        self.inner.shared.engine.read().shared_state().clone()
    }

    /// Status of the agent run.
    pub fn run_status(&self) -> RunStatus {
        self.inner.shared.engine.read().run_status().clone()
    }

    /// Event log, oldest first.
    pub fn event_log(&self) -> Vec<LogEntry> {
        self.inner.shared.log.lock().entries()
    }

    /// Empty the event log.
    pub fn clear_event_log(&self) {
        self.inner.shared.log.lock().clear();
    }

    /// Stop both tasks and close the transport. Every clone stops working.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        debug!("client shut down");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Consumer
// ─────────────────────────────────────────────────────────────────────────────

async fn consume(
    shared: Arc<Shared>,
    mut frames: mpsc::Receiver<String>,
    mut lifecycle: broadcast::Receiver<LifecycleEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(text) => shared.handle_frame(&text),
                None => break,
            },
            event = lifecycle.recv() => match event {
                Ok(event) => shared.record_lifecycle(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "lifecycle log lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("frame consumer stopped");
}

impl Shared {
    fn handle_frame(&self, text: &str) {
        match decode_frame(text) {
            Ok(Decoded::Event(event)) => {
                // Lock released before handlers run
                let update = self.engine.write().apply(&event);
                debug!(
                    event_kind = %event.kind(),
                    cards = update.cards.len(),
                    "event applied"
                );
                self.report(self.router.dispatch_event(&event));
                self.record(
                    LogCategory::Event,
                    serde_json::to_value(&event).unwrap_or_default(),
                );
            }
            Ok(Decoded::Opaque(message)) => {
                self.report(self.router.dispatch_message(&message));
                self.record(LogCategory::Message, message.payload);
            }
            Err(e) => {
                warn!(error = %e, "dropping frame");
                self.fail(e.into());
            }
        }
    }

    fn report(&self, report: DispatchReport) {
        for (_, err) in report.failures {
            self.fail(err.into());
        }
    }

    /// Log an error raised on this task, then publish it.
    fn fail(&self, error: ClientError) {
        self.record_error(&error);
        self.emit(LifecycleEvent::Error(error));
    }

    fn record_error(&self, error: &ClientError) {
        self.record(
            LogCategory::Error,
            json!({
                "kind": error.error_kind(),
                "message": error.to_string(),
                "retryable": error.is_retryable(),
            }),
        );
    }

    fn record_lifecycle(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::EventLogged(_) => {}
            // Frame and handler errors were logged by `fail`
            LifecycleEvent::Error(e @ ClientError::Transport(_)) => self.record_error(e),
            LifecycleEvent::Error(_) => {}
            LifecycleEvent::Reconnecting {
                attempt,
                max_attempts,
                delay,
            } => self.record(
                LogCategory::Connection,
                json!({
                    "event": event.name(),
                    "attempt": attempt,
                    "max_attempts": max_attempts,
                    "delay_ms": u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                }),
            ),
            LifecycleEvent::ReconnectFailed { attempts } => self.record(
                LogCategory::Connection,
                json!({ "event": event.name(), "attempts": attempts }),
            ),
            LifecycleEvent::Connected | LifecycleEvent::Disconnected => {
                self.record(LogCategory::Connection, json!({ "event": event.name() }));
            }
        }
    }

    fn record(&self, category: LogCategory, payload: Value) {
        let entry = self.log.lock().record(category, payload);
        self.emit(LifecycleEvent::EventLogged(entry));
    }

    fn emit(&self, event: LifecycleEvent) {
        let _ = self.lifecycle.send(event);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
