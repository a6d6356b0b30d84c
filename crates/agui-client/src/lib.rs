//! # agui-client
//!
//! Async transport layer and consumer façade for AG-UI card streams.
//!
//! - [`connection`]: the connection actor (connect, reconnect, heartbeat, queue)
//! - [`transport`]: the [`Connector`] seam and its `tokio-tungstenite` implementation
//! - [`backoff`]: exponential reconnect delays
//! - [`queue`]: bounded outbound queue used while offline
//! - [`heartbeat`]: missed-pong bookkeeping
//! - [`lifecycle`]: connection status and broadcast notifications
//! - [`client`]: [`AguiClient`], the one object applications hold
//!
//! Two tasks do all the work: the connection actor owns every piece of
//! connection state, and the frame consumer owns every state mutation.

#![deny(unsafe_code)]

pub mod backoff;
pub mod client;
pub mod connection;
pub mod heartbeat;
pub mod lifecycle;
pub mod queue;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use client::AguiClient;
pub use connection::{ConnectionHandle, ConnectionManager, SendOutcome};
pub use lifecycle::{ConnectionStatus, LifecycleEvent};
pub use transport::{Connector, Link, TransportFrame, WsConnector};
