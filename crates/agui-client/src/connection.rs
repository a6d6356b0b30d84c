//! The connection actor.
//!
//! One task owns the connection: its status, the open in flight, the link,
//! the heartbeat, the reconnect timer and the outbound queue. Everything
//! else talks to it through a [`ConnectionHandle`]. Inbound text frames are
//! forwarded, in arrival order, to the frame channel drained by the
//! consumer.
//!
//! Timers live inside the actor as plain fields. Dropping a field drops its
//! timer, so after `disconnect()` nothing scheduled earlier can fire.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use agui_core::errors::{ClientError, TransportError};
use agui_core::ids::ConnectionId;
use agui_core::outbound::OutboundMessage;
use agui_settings::ClientSettings;
use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::heartbeat::{HeartbeatVerdict, Liveness};
use crate::lifecycle::{ConnectionStatus, LifecycleEvent};
use crate::queue::OutboundQueue;
use crate::transport::{Connector, Link, TransportFrame};

/// Command channel depth.
const COMMAND_BUFFER: usize = 64;

/// What happened to a message handed to [`ConnectionHandle::send`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the transport.
    Sent,
    /// Held in the outbound queue until the next successful open.
    Queued,
    /// The write failed.
    Failed(TransportError),
}

enum Command {
    Connect,
    Disconnect { done: oneshot::Sender<()> },
    Send {
        message: OutboundMessage,
        reply: oneshot::Sender<SendOutcome>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Cheap, cloneable handle to the connection actor.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connect => f.write_str("Connect"),
            Self::Disconnect { .. } => f.write_str("Disconnect"),
            Self::Send { message, .. } => write!(f, "Send({})", message.label()),
        }
    }
}

impl ConnectionHandle {
    /// Ask the actor to connect. Returns once the request is queued; watch
    /// [`status`](Self::status) or lifecycle events for the outcome.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.commands
            .send(Command::Connect)
            .await
            .map_err(|_| ClientError::Shutdown)
    }

    /// Disconnect and wait until the actor has torn everything down.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        let (done, wait) = oneshot::channel();
        self.commands
            .send(Command::Disconnect { done })
            .await
            .map_err(|_| ClientError::Shutdown)?;
        wait.await.map_err(|_| ClientError::Shutdown)
    }

    /// Send now if connected, otherwise queue.
    pub async fn send(&self, message: OutboundMessage) -> SendOutcome {
        let (reply, wait) = oneshot::channel();
        let stopped = || {
            SendOutcome::Failed(TransportError::SendFailed(
                "connection manager stopped".into(),
            ))
        };
        if self
            .commands
            .send(Command::Send { message, reply })
            .await
            .is_err()
        {
            return stopped();
        }
        wait.await.unwrap_or_else(|_| stopped())
    }

    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// A receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

/// Builds and spawns the connection actor.
pub struct ConnectionManager {
    settings: ClientSettings,
    connector: Arc<dyn Connector>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    frames: mpsc::Sender<String>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    /// Prepare an actor. Inbound text frames go to `frames`; notifications go
    /// to `lifecycle`; cancelling `shutdown` stops the actor.
    pub fn new(
        settings: ClientSettings,
        connector: Arc<dyn Connector>,
        lifecycle: broadcast::Sender<LifecycleEvent>,
        frames: mpsc::Sender<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            settings,
            connector,
            lifecycle,
            frames,
            shutdown,
        }
    }

    /// Spawn the actor task.
    pub fn spawn(self) -> (ConnectionHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);

        let actor = Actor {
            endpoint: self.settings.endpoint(),
            connector: self.connector,
            policy: ReconnectPolicy::from_settings(&self.settings),
            auto_reconnect_default: self.settings.auto_reconnect,
            auto_reconnect: self.settings.auto_reconnect,
            heartbeat_period: self.settings.heartbeat_interval(),
            pong_timeout: self.settings.pong_timeout(),
            attempts: 0,
            status: status_tx,
            queue: OutboundQueue::new(self.settings.max_queued_messages),
            opening: None,
            reconnect_timer: None,
            link: None,
            heartbeat: None,
            liveness: Liveness::new(
                self.settings.heartbeat_interval(),
                self.settings.pong_timeout(),
            ),
            connection_id: None,
            lifecycle: self.lifecycle,
            frames: self.frames,
        };

        let task = tokio::spawn(actor.run(cmd_rx, self.shutdown));
        (
            ConnectionHandle {
                commands: cmd_tx,
                status: status_rx,
            },
            task,
        )
    }
}

struct Actor {
    endpoint: String,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    auto_reconnect_default: bool,
    auto_reconnect: bool,
    heartbeat_period: Duration,
    pong_timeout: Option<Duration>,
    attempts: u32,
    status: watch::Sender<ConnectionStatus>,
    queue: OutboundQueue,

    opening: Option<BoxFuture<'static, Result<Link, TransportError>>>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    link: Option<Link>,
    heartbeat: Option<Interval>,
    liveness: Liveness,
    connection_id: Option<ConnectionId>,

    lifecycle: broadcast::Sender<LifecycleEvent>,
    frames: mpsc::Sender<String>,
}

impl Actor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,

                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },

                result = poll_open(&mut self.opening) => {
                    self.opening = None;
                    match result {
                        Ok(link) => self.on_open(link).await,
                        Err(e) => self.on_open_failed(e),
                    }
                }

                frame = next_frame(&mut self.link) => match frame {
                    Some(TransportFrame::Text(text)) => {
                        self.liveness.mark_alive();
                        if self.frames.send(text).await.is_err() {
                            debug!("frame consumer gone, dropping frame");
                        }
                    }
                    Some(TransportFrame::Pong) => self.liveness.mark_alive(),
                    Some(TransportFrame::Closed(reason)) => self.on_unexpected_close(&reason),
                    None => self.on_unexpected_close("transport ended"),
                },

                () = next_tick(&mut self.heartbeat) => self.on_heartbeat().await,

                () = wait_timer(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    self.on_reconnect_due();
                }
            }
        }

        self.teardown();
        self.set_status(ConnectionStatus::Disconnected);
        debug!(endpoint = %self.endpoint, "connection manager stopped");
    }

    // ── Commands ────────────────────────────────────────────────────────

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => self.on_connect(),
            Command::Disconnect { done } => {
                self.on_disconnect();
                let _ = done.send(());
            }
            Command::Send { message, reply } => {
                let outcome = self.on_send(message).await;
                let _ = reply.send(outcome);
            }
        }
    }

    fn on_connect(&mut self) {
        let status = *self.status.borrow();
        if status != ConnectionStatus::Disconnected {
            warn!(%status, endpoint = %self.endpoint, "connect ignored, already {status}");
            return;
        }
        self.auto_reconnect = self.auto_reconnect_default;
        self.reconnect_timer = None;
        self.attempts = 0;
        self.start_open();
    }

    fn on_disconnect(&mut self) {
        let was = *self.status.borrow();
        let had_timer = self.reconnect_timer.is_some();
        self.auto_reconnect = false;
        self.attempts = 0;
        self.teardown();
        self.set_status(ConnectionStatus::Disconnected);
        if was != ConnectionStatus::Disconnected || had_timer {
            info!(endpoint = %self.endpoint, "disconnected by request");
            self.emit(LifecycleEvent::Disconnected);
        }
    }

    async fn on_send(&mut self, message: OutboundMessage) -> SendOutcome {
        if *self.status.borrow() != ConnectionStatus::Connected {
            let _ = self.queue.push(message);
            debug!(queued = self.queue.len(), "not connected, message queued");
            return SendOutcome::Queued;
        }
        match self.transmit(&message).await {
            Ok(()) => SendOutcome::Sent,
            Err(e) => {
                self.on_transport_error(e.clone());
                SendOutcome::Failed(e)
            }
        }
    }

    // ── Open / close ────────────────────────────────────────────────────

    fn start_open(&mut self) {
        self.set_status(ConnectionStatus::Connecting);
        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        info!(endpoint = %endpoint, attempt = self.attempts, "opening connection");
        self.opening = Some(Box::pin(async move { connector.connect(&endpoint).await }));
    }

    async fn on_open(&mut self, link: Link) {
        self.link = Some(link);

        self.heartbeat = if self.heartbeat_period.is_zero() {
            debug!(endpoint = %self.endpoint, "heartbeat disabled");
            None
        } else {
            let mut heartbeat = tokio::time::interval_at(
                Instant::now() + self.heartbeat_period,
                self.heartbeat_period,
            );
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(heartbeat)
        };
        self.liveness = Liveness::new(self.heartbeat_period, self.pong_timeout);

        let connection_id = ConnectionId::generate();
        info!(endpoint = %self.endpoint, %connection_id, "connected");
        self.connection_id = Some(connection_id);
        self.attempts = 0;
        self.set_status(ConnectionStatus::Connected);
        self.emit(LifecycleEvent::Connected);

        self.flush_queue().await;
    }

    fn on_open_failed(&mut self, e: TransportError) {
        warn!(endpoint = %self.endpoint, error = %e, "connection attempt failed");
        self.set_status(ConnectionStatus::Disconnected);
        self.emit(LifecycleEvent::Error(e.into()));
        self.schedule_reconnect();
    }

    fn on_unexpected_close(&mut self, reason: &str) {
        warn!(
            endpoint = %self.endpoint,
            connection_id = ?self.connection_id,
            reason,
            "connection closed"
        );
        self.teardown();
        self.set_status(ConnectionStatus::Disconnected);
        self.emit(LifecycleEvent::Disconnected);
        self.schedule_reconnect();
    }

    fn on_transport_error(&mut self, e: TransportError) {
        self.emit(LifecycleEvent::Error(e.clone().into()));
        self.on_unexpected_close(&e.to_string());
    }

    /// Drop the link, heartbeat, open in flight and reconnect timer.
    fn teardown(&mut self) {
        self.opening = None;
        self.reconnect_timer = None;
        self.link = None;
        self.heartbeat = None;
        self.connection_id = None;
    }

    // ── Reconnect ───────────────────────────────────────────────────────

    fn schedule_reconnect(&mut self) {
        if !self.auto_reconnect {
            debug!("auto-reconnect disabled, staying disconnected");
            return;
        }
        if !self.policy.allows(self.attempts) {
            error!(
                endpoint = %self.endpoint,
                attempts = self.attempts,
                "reconnect attempts exhausted"
            );
            self.emit(LifecycleEvent::ReconnectFailed {
                attempts: self.attempts,
            });
            return;
        }
        self.attempts += 1;
        let delay = self.policy.delay_for(self.attempts);
        info!(
            attempt = self.attempts,
            max_attempts = self.policy.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "scheduling reconnect"
        );
        self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
        self.emit(LifecycleEvent::Reconnecting {
            attempt: self.attempts,
            max_attempts: self.policy.max_attempts,
            delay,
        });
    }

    fn on_reconnect_due(&mut self) {
        if *self.status.borrow() != ConnectionStatus::Disconnected || !self.auto_reconnect {
            debug!("reconnect timer fired but no longer needed");
            return;
        }
        self.start_open();
    }

    // ── Heartbeat ───────────────────────────────────────────────────────

    async fn on_heartbeat(&mut self) {
        if *self.status.borrow() != ConnectionStatus::Connected {
            self.heartbeat = None;
            return;
        }
        match self.liveness.tick() {
            HeartbeatVerdict::Dead => {
                let timeout_ms = self
                    .pong_timeout
                    .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
                self.on_transport_error(TransportError::HeartbeatTimeout { timeout_ms });
                return;
            }
            HeartbeatVerdict::Missed(n) => debug!(missed = n, "no activity since last heartbeat"),
            HeartbeatVerdict::Healthy => {}
        }
        if let Err(e) = self.transmit(&OutboundMessage::ping()).await {
            self.on_transport_error(e);
        }
    }

    // ── Outbound ────────────────────────────────────────────────────────

    async fn transmit(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        let text = message
            .encode()
            .map_err(|e| TransportError::SendFailed(format!("encode failed: {e}")))?;
        let Some(link) = &self.link else {
            return Err(TransportError::SendFailed("no open transport".into()));
        };
        link.outbound
            .send(text)
            .await
            .map_err(|_| TransportError::SendFailed("transport writer closed".into()))
    }

    async fn flush_queue(&mut self) {
        let queued = self.queue.drain();
        if queued.is_empty() {
            return;
        }
        info!(count = queued.len(), "flushing queued messages");
        let mut pending = queued.into_iter();
        while let Some(message) = pending.next() {
            if let Err(e) = self.transmit(&message).await {
                let mut rest = vec![message];
                rest.extend(pending);
                self.queue.requeue_front(rest);
                self.on_transport_error(e);
                return;
            }
        }
    }

    // ── Notifications ───────────────────────────────────────────────────

    fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status.send_replace(status);
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.lifecycle.send(event);
    }
}

async fn poll_open(
    opening: &mut Option<BoxFuture<'static, Result<Link, TransportError>>>,
) -> Result<Link, TransportError> {
    match opening {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_frame(link: &mut Option<Link>) -> Option<TransportFrame> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => pending().await,
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending::<()>().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LinkPeer;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted connector: each call pops the next planned outcome; an empty
    /// script fails.
    #[derive(Default)]
    struct MockConnector {
        calls: AtomicU32,
        script: Mutex<VecDeque<Result<Link, TransportError>>>,
    }

    impl MockConnector {
        fn failing() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn push_link(&self) -> LinkPeer {
            let (link, peer) = Link::channel(16);
            self.script.lock().push_back(Ok(link));
            peer
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().pop_front().unwrap_or_else(|| {
                Err(TransportError::ConnectFailed {
                    endpoint: endpoint.to_owned(),
                    reason: "refused".into(),
                })
            })
        }
    }

    struct Harness {
        handle: ConnectionHandle,
        events: broadcast::Receiver<LifecycleEvent>,
        frames: mpsc::Receiver<String>,
        shutdown: CancellationToken,
    }

    fn spawn(settings: ClientSettings, connector: Arc<MockConnector>) -> Harness {
        let (lifecycle, events) = broadcast::channel(256);
        let (frames_tx, frames) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let (handle, _task) =
            ConnectionManager::new(settings, connector, lifecycle, frames_tx, shutdown.clone())
                .spawn();
        Harness {
            handle,
            events,
            frames,
            shutdown,
        }
    }

    fn settings() -> ClientSettings {
        ClientSettings::default()
    }

    async fn wait_status(handle: &ConnectionHandle, want: ConnectionStatus) {
        let mut rx = handle.watch_status();
        let _ = rx.wait_for(|s| *s == want).await.unwrap();
    }

    fn drain(events: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = events.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn connect_opens_and_forwards_frames() {
        let connector = MockConnector::failing();
        let peer = connector.push_link();
        let mut h = spawn(settings(), connector.clone());

        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;

        peer.frames
            .send(TransportFrame::Text("{\"type\":\"RUN_STARTED\"}".into()))
            .await
            .unwrap();
        assert_eq!(h.frames.recv().await.as_deref(), Some("{\"type\":\"RUN_STARTED\"}"));
        assert!(drain(&mut h.events).contains(&LifecycleEvent::Connected));
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_connected_is_a_noop() {
        let connector = MockConnector::failing();
        let _peer = connector.push_link();
        let h = spawn(settings(), connector.clone());

        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;
        h.handle.connect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.calls(), 1);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_reconnects_are_terminal_until_manual_connect() {
        let connector = MockConnector::failing();
        let mut h = spawn(settings(), connector.clone());

        h.handle.connect().await.unwrap();
        // 3 + 4.5 + 6.75 + 10.125 + 15.1875 s of backoff, with margin
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.calls(), 6);
        let events = drain(&mut h.events);
        let attempts: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                LifecycleEvent::Reconnecting { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![1, 2, 3, 4, 5]);
        assert!(events.contains(&LifecycleEvent::ReconnectFailed { attempts: 5 }));
        assert_eq!(h.handle.status(), ConnectionStatus::Disconnected);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.calls(), 6);

        let _peer = connector.push_link();
        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;
        assert_eq!(connector.calls(), 7);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_delays_follow_backoff() {
        let connector = MockConnector::failing();
        let mut h = spawn(settings(), connector.clone());
        h.handle.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let delays: Vec<u128> = drain(&mut h.events)
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::Reconnecting { delay, .. } => Some(delay.as_millis()),
                _ => None,
            })
            .collect();
        assert_eq!(delays, vec![3000, 4500, 6750, 10125, 15187]);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let connector = MockConnector::failing();
        let peer = connector.push_link();
        let mut h = spawn(settings(), connector.clone());

        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;

        peer.frames
            .send(TransportFrame::Closed("server restart".into()))
            .await
            .unwrap();
        wait_status(&h.handle, ConnectionStatus::Disconnected).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, LifecycleEvent::Reconnecting { attempt: 1, .. })));

        h.handle.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.calls(), 1);
        assert_eq!(h.handle.status(), ConnectionStatus::Disconnected);
        let events = drain(&mut h.events);
        assert!(!events.iter().any(|e| matches!(e, LifecycleEvent::Reconnecting { .. })));
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn manual_disconnect_never_reconnects() {
        let connector = MockConnector::failing();
        let _peer = connector.push_link();
        let mut h = spawn(settings(), connector.clone());

        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;
        h.handle.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(connector.calls(), 1);
        let events = drain(&mut h.events);
        assert_eq!(
            events,
            vec![LifecycleEvent::Connected, LifecycleEvent::Disconnected]
        );
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn queued_messages_flush_in_order_on_open() {
        let connector = MockConnector::failing();
        let mut peer = connector.push_link();
        let h = spawn(settings(), connector.clone());

        for text in ["first", "second", "third"] {
            let outcome = h.handle.send(OutboundMessage::from(text)).await;
            assert_eq!(outcome, SendOutcome::Queued);
        }
        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;

        for want in ["first", "second", "third"] {
            assert_eq!(peer.sent.recv().await.as_deref(), Some(want));
        }
        assert_eq!(
            h.handle.send(OutboundMessage::from("live")).await,
            SendOutcome::Sent
        );
        assert_eq!(peer.sent.recv().await.as_deref(), Some("live"));
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_sends_ping_while_connected() {
        let connector = MockConnector::failing();
        let mut peer = connector.push_link();
        let h = spawn(settings(), connector.clone());

        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;
        tokio::time::sleep(Duration::from_secs(31)).await;

        let ping = peer.sent.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&ping).unwrap();
        assert_eq!(value["type"], "ping");
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_connection_is_closed_and_retried() {
        let connector = MockConnector::failing();
        let _peer = connector.push_link();
        let mut h = spawn(settings(), connector.clone());

        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;
        // Ticks at 30 (healthy), 60, 90 (missed), 120 (dead), retry at 123
        tokio::time::sleep(Duration::from_secs(125)).await;

        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            LifecycleEvent::Error(ClientError::Transport(TransportError::HeartbeatTimeout { .. }))
        )));
        assert!(events.contains(&LifecycleEvent::Disconnected));
        assert!(connector.calls() >= 2);
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn pong_keeps_connection_alive() {
        let connector = MockConnector::failing();
        let peer = connector.push_link();
        let mut h = spawn(settings(), connector.clone());

        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;
        for _ in 0..8 {
            tokio::time::sleep(Duration::from_secs(20)).await;
            peer.frames.send(TransportFrame::Pong).await.unwrap();
        }
        assert_eq!(h.handle.status(), ConnectionStatus::Connected);
        assert!(!drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, LifecycleEvent::Error(_))));
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_heartbeat_interval_disables_pings() {
        let connector = MockConnector::failing();
        let mut peer = connector.push_link();
        let s = ClientSettings {
            heartbeat_interval_ms: 0,
            ..settings()
        };
        let mut h = spawn(s, connector.clone());

        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(h.handle.status(), ConnectionStatus::Connected);
        assert!(peer.sent.try_recv().is_err());
        // Actor is still serving commands
        h.handle.connect().await.unwrap();
        assert_eq!(
            h.handle.send(OutboundMessage::get_state()).await,
            SendOutcome::Sent
        );
        assert!(peer.sent.recv().await.unwrap().contains("get_state"));
        assert!(!drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, LifecycleEvent::Error(_))));
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn auto_reconnect_disabled_stays_down() {
        let connector = MockConnector::failing();
        let peer = connector.push_link();
        let s = ClientSettings {
            auto_reconnect: false,
            ..settings()
        };
        let mut h = spawn(s, connector.clone());

        h.handle.connect().await.unwrap();
        wait_status(&h.handle, ConnectionStatus::Connected).await;
        drop(peer);
        wait_status(&h.handle, ConnectionStatus::Disconnected).await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(connector.calls(), 1);
        assert!(!drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, LifecycleEvent::Reconnecting { .. })));
        h.shutdown.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn send_after_shutdown_fails() {
        let connector = MockConnector::failing();
        let h = spawn(settings(), connector);
        h.shutdown.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_matches!(
            h.handle.send(OutboundMessage::ping()).await,
            SendOutcome::Failed(TransportError::SendFailed(_))
        );
        assert_matches!(h.handle.connect().await, Err(ClientError::Shutdown));
    }
}
