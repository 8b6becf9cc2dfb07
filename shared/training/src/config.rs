use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 20;

/// Timing of the status poller. Lives in the `[monitor]` table of the
/// config file; every key is optional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    /// Upper bound for the delay after repeated fetch failures.
    pub max_backoff_ms: u64,
    /// A status fetch that takes longer than this counts as failed.
    pub fetch_timeout_ms: u64,
    /// `None` keeps retrying forever.
    pub max_consecutive_failures: Option<u32>,
    /// Fraction of the backoff delay added as random jitter, in `[0, 1]`.
    pub backoff_jitter: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            max_consecutive_failures: Some(DEFAULT_MAX_CONSECUTIVE_FAILURES),
            backoff_jitter: 0.1,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Delay before the next fetch. With no failures this is the plain poll
    /// interval; every consecutive failure doubles it, capped at
    /// `max_backoff_ms`, before jitter is added.
    pub fn next_delay(&self, consecutive_failures: u32) -> Duration {
        let base = self.poll_interval_ms.max(1);
        if consecutive_failures == 0 {
            return Duration::from_millis(base);
        }
        let exp = consecutive_failures.min(16);
        let cap = self.max_backoff_ms.max(base);
        let delay = base.saturating_mul(1u64 << exp).min(cap);

        let jitter = self.backoff_jitter.clamp(0.0, 1.0);
        if jitter > 0.0 {
            let extra = rand::rng().random_range(0.0..=jitter) * delay as f64;
            Duration::from_millis(delay + extra as u64)
        } else {
            Duration::from_millis(delay)
        }
    }

    pub fn is_failure_cap_reached(&self, consecutive_failures: u32) -> bool {
        self.max_consecutive_failures.is_some_and(|max| consecutive_failures >= max)
    }
}
