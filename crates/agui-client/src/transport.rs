//! Transport seam.
//!
//! A [`Connector`] opens a [`Link`]: a pair of channels carrying outbound
//! text frames and inbound [`TransportFrame`]s. The connection actor only
//! ever sees links, so tests drive it with [`Link::channel`] and never touch
//! a socket.
//!
//! [`WsConnector`] is the real implementation over `tokio-tungstenite`. It
//! splits the socket into a reader task and a writer task. Dropping the link
//! closes the socket.

use std::time::Duration;

use agui_core::errors::TransportError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default bound on the per-link channels.
pub const LINK_BUFFER: usize = 256;
/// Default time allowed for the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Something received from the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportFrame {
    /// A text frame.
    Text(String),
    /// A transport-level pong (liveness only).
    Pong,
    /// The peer closed, or the transport failed.
    Closed(String),
}

/// An open transport.
#[derive(Debug)]
pub struct Link {
    /// Outbound text frames.
    pub outbound: mpsc::Sender<String>,
    /// Inbound frames.
    pub inbound: mpsc::Receiver<TransportFrame>,
    _guard: Option<DropGuard>,
}

/// The far side of a [`Link::channel`] pair.
#[derive(Debug)]
pub struct LinkPeer {
    /// Frames the client sent.
    pub sent: mpsc::Receiver<String>,
    /// Push frames to the client.
    pub frames: mpsc::Sender<TransportFrame>,
}

impl Link {
    /// Wrap existing channels.
    pub fn new(outbound: mpsc::Sender<String>, inbound: mpsc::Receiver<TransportFrame>) -> Self {
        Self {
            outbound,
            inbound,
            _guard: None,
        }
    }

    /// An in-memory link and its peer.
    pub fn channel(buffer: usize) -> (Self, LinkPeer) {
        let (out_tx, out_rx) = mpsc::channel(buffer);
        let (in_tx, in_rx) = mpsc::channel(buffer);
        (
            Self::new(out_tx, in_rx),
            LinkPeer {
                sent: out_rx,
                frames: in_tx,
            },
        )
    }

    /// Cancel `token` when this link is dropped.
    #[must_use]
    pub fn with_drop_guard(mut self, token: CancellationToken) -> Self {
        self._guard = Some(token.drop_guard());
        self
    }
}

/// Opens links to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a link to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// WebSocket connector over `tokio-tungstenite`.
#[derive(Clone, Debug)]
pub struct WsConnector {
    connect_timeout: Duration,
    buffer: usize,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            buffer: LINK_BUFFER,
        }
    }
}

impl WsConnector {
    /// Connector with a custom handshake timeout.
    pub fn with_timeout(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link, TransportError> {
        let connect_failed = |reason: String| TransportError::ConnectFailed {
            endpoint: endpoint.to_owned(),
            reason,
        };

        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(endpoint))
            .await
            .map_err(|_| {
                connect_failed(format!(
                    "handshake timed out after {}ms",
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| connect_failed(e.to_string()))?;

        debug!(endpoint, "websocket open");

        let (out_tx, out_rx) = mpsc::channel(self.buffer);
        let (in_tx, in_rx) = mpsc::channel(self.buffer);
        let token = CancellationToken::new();
        let _ = tokio::spawn(socket_loop(ws, out_rx, in_tx, token.clone()));

        Ok(Link::new(out_tx, in_rx).with_drop_guard(token))
    }
}

/// Pump frames between the socket and the link channels until either side
/// goes away.
async fn socket_loop(
    ws: WsStream,
    mut out_rx: mpsc::Receiver<String>,
    in_tx: mpsc::Sender<TransportFrame>,
    token: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let reason = loop {
        tokio::select! {
            () = token.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                let _ = ws_tx.close().await;
                return;
            }
            out = out_rx.recv() => {
                let Some(text) = out else {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    let _ = ws_tx.close().await;
                    return;
                };
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    break format!("write failed: {e}");
                }
            }
            msg = ws_rx.next() => {
                let frame = match msg {
                    Some(Ok(Message::Text(text))) => TransportFrame::Text(text.to_string()),
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => TransportFrame::Text(text),
                        Err(_) => {
                            warn!("dropping non-UTF-8 binary frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Pong(_))) => TransportFrame::Pong,
                    Some(Ok(Message::Ping(_) | Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map_or_else(
                            || "closed by peer".to_owned(),
                            |f| format!("closed by peer: {} {}", f.code, f.reason),
                        );
                    }
                    Some(Err(e)) => break format!("read failed: {e}"),
                    None => break "stream ended".to_owned(),
                };
                if in_tx.send(frame).await.is_err() {
                    return;
                }
            }
        }
    };

    debug!(%reason, "websocket closed");
    let _ = in_tx.send(TransportFrame::Closed(reason)).await;
}
