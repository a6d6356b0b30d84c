//! Reconnect backoff.
//!
//! Attempt `n` (1-based) waits `base * multiplier^(n-1)`. No jitter: the
//! delay sequence is deterministic so it can be asserted in tests.

use std::time::Duration;

use agui_settings::ClientSettings;

/// Upper bound on any single delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(3600);

/// Reconnect parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    pub base: Duration,
    /// Growth factor per further attempt.
    pub multiplier: f64,
    /// Attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

impl ReconnectPolicy {
    /// Policy described by `settings`.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            base: settings.reconnect_interval(),
            multiplier: settings.reconnect_multiplier,
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Delay before attempt `attempt` (1-based; 0 is treated as 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map_or(MAX_RECONNECT_DELAY, |d| d.min(MAX_RECONNECT_DELAY))
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(3000),
            multiplier: 1.5,
            max_attempts: 5,
        }
    }

    #[test]
    fn delay_sequence_is_geometric() {
        let p = policy();
        let delays: Vec<u128> = (1..=5).map(|n| p.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![3000, 4500, 6750, 10125, 15187]);
    }

    #[test]
    fn attempt_zero_uses_base() {
        assert_eq!(policy().delay_for(0), Duration::from_secs(3));
    }

    #[test]
    fn huge_attempts_are_capped() {
        assert_eq!(policy().delay_for(u32::MAX), MAX_RECONNECT_DELAY);
    }

    #[test]
    fn allows_up_to_max_attempts() {
        let p = policy();
        assert!(p.allows(0));
        assert!(p.allows(4));
        assert!(!p.allows(5));
    }

    #[test]
    fn defaults_match_settings() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.base, Duration::from_secs(3));
        assert_eq!(p.max_attempts, 5);
    }
}
