//! # agui-state
//!
//! Synchronous reconciliation of AG-UI events into card and message state.
//!
//! - [`router`]: frame decoding and handler dispatch
//! - [`store`]: the card map and its status machine
//! - [`accumulator`]: streamed text messages and their companion cards
//! - [`log`]: bounded event log
//! - [`engine`]: [`StateEngine`] ties the pieces together for one consumer
//!
//! Nothing here is async. The client crate drives a [`StateEngine`] from a
//! single consumer task, so events are applied strictly in arrival order.

#![deny(unsafe_code)]

pub mod accumulator;
pub mod engine;
pub mod log;
pub mod router;
pub mod store;

pub use accumulator::{AccumulatorConfig, MessageAccumulator};
pub use engine::{EngineUpdate, RunStatus, StateEngine};
pub use log::{EventLog, LogCategory, LogEntry};
pub use router::{Decoded, DispatchReport, EventRouter, HandlerId, OpaqueMessage, decode_frame};
pub use store::CardStateStore;
