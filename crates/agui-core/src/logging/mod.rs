//! Structured logging with `tracing`.
//!
//! - [`init_subscriber`] sets up compact human-readable output on stderr
//! - [`init_json_subscriber`] sets up one JSON object per line on stderr
//! - [`capture_logs`] records events in memory for test assertions
//!
//! Both initialisers honour `RUST_LOG` when it is set and fall back to the
//! supplied level otherwise.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

use tracing_subscriber::EnvFilter;

/// Default level when neither the caller nor `RUST_LOG` specify one.
pub const DEFAULT_LEVEL: &str = "warn";

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // set_global_default is a no-op if already set
    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with JSON lines on stderr.
pub fn init_json_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("debug");
        init_subscriber("info");
        init_json_subscriber("info");
    }
}
