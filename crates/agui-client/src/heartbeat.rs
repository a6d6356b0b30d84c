//! Missed-pong bookkeeping.
//!
//! Any inbound activity marks the connection alive. At each heartbeat tick
//! a connection that has been silent since the previous tick counts one
//! miss; `max_missed` consecutive misses mean the peer is gone.
//!
//! `max_missed` is `timeout / interval`, clamped to at least 1. With no
//! timeout the connection is never declared dead.

use std::time::Duration;

/// Verdict of one heartbeat tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    /// Activity was seen since the last tick.
    Healthy,
    /// No activity; `n` consecutive misses so far.
    Missed(u32),
    /// Too many consecutive misses.
    Dead,
}

/// Liveness state for one connection.
#[derive(Clone, Debug)]
pub struct Liveness {
    alive: bool,
    missed: u32,
    max_missed: Option<u32>,
}

impl Liveness {
    /// Fresh state; the connection starts out alive.
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self {
            alive: true,
            missed: 0,
            max_missed: timeout.map(|t| max_missed(interval, t)),
        }
    }

    /// Record inbound activity.
    pub fn mark_alive(&mut self) {
        self.alive = true;
    }

    /// Evaluate one tick and start a new observation window.
    pub fn tick(&mut self) -> HeartbeatVerdict {
        let verdict = if self.alive {
            self.missed = 0;
            HeartbeatVerdict::Healthy
        } else {
            self.missed = self.missed.saturating_add(1);
            match self.max_missed {
                Some(max) if self.missed >= max => HeartbeatVerdict::Dead,
                _ => HeartbeatVerdict::Missed(self.missed),
            }
        };
        // Not alive until the next frame arrives
        self.alive = false;
        verdict
    }

    /// Consecutive misses so far.
    pub fn missed(&self) -> u32 {
        self.missed
    }
}

/// `timeout / interval`, at least 1.
pub fn max_missed(interval: Duration, timeout: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    u32::try_from(timeout.as_millis() / interval_ms)
        .unwrap_or(u32::MAX)
        .max(1)
}
