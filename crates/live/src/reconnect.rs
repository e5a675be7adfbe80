//! Reconnection delay policy for the live status channel.
//!
//! The default is a fixed 5 second pause between attempts, retried
//! forever. [`ReconnectConfig::exponential`] gives a growing delay
//! clamped to a ceiling instead.

use std::time::Duration;

/// Fixed delay used when nothing else is configured.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Tunable parameters for the reconnect delay.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure. `1.0` keeps it fixed.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectConfig {
    /// Same delay before every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Delay starting at `initial`, multiplied by `multiplier` after each
    /// failure and clamped to `max`.
    pub fn exponential(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max.max(initial),
            multiplier,
        }
    }

    /// Calculate the next delay from the current one.
    ///
    /// The result is clamped to [`max_delay`](Self::max_delay) and never
    /// drops below [`initial_delay`](Self::initial_delay).
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.multiplier.max(1.0)) as u64;
        Duration::from_millis(next_ms)
            .min(self.max_delay)
            .max(self.initial_delay)
    }
}
