//! # agui-core
//!
//! Foundation types, errors, branded IDs, and utilities for the AG-UI card client.
//!
//! This crate provides the shared vocabulary that all other client crates depend on:
//!
//! - **Branded IDs**: `CardId`, `MessageId`, `ToolCallId`, `StepId` as newtypes for type safety
//! - **Protocol events**: [`events::AguiEvent`] tagged enum and the closed [`events::EventKind`] set
//! - **Cards**: [`cards::CardRecord`], partial [`cards::CardPatch`], and the status state machine
//! - **Messages**: [`messages::MessageRecord`] for streamed text
//! - **Outbound**: [`outbound::OutboundMessage`] frames sent to the server
//! - **Errors**: transport / protocol / handler taxonomy via `thiserror`
//! - **Logging**: `tracing` subscriber setup and in-memory log capture for tests

#![deny(unsafe_code)]

pub mod cards;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod outbound;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current wall-clock time in epoch milliseconds, with sub-millisecond
/// precision, for fields that keep server timestamps as floats.
#[allow(clippy::cast_precision_loss)]
pub fn now_millis_f64() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1000.0
}

/// Human-readable local time used for card timestamps (`HH:MM:SS`).
pub fn display_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
