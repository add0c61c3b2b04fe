//! Per-node failure policy and exponential backoff.
//!
//! Resolved at failure time by the scheduler: `FailFast` aborts the run,
//! `Retry` re-runs the node with backoff until attempts are exhausted (then
//! aborts), `Skip` treats the node as skipped for routing, and `Fallback`
//! executes an alternate node in its place.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do when a node execution fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// Abort the run on the first failure. The default.
    FailFast,
    /// Re-run up to `max_attempts` additional times with exponential
    /// backoff; exhausting attempts aborts the run.
    Retry {
        max_attempts: u32,
        backoff: Backoff,
    },
    /// Mark the node skipped and keep routing as if it never matched.
    Skip,
    /// Execute `node`'s executor instead; its output is recorded under the
    /// failing node's id.
    Fallback { node: String },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::FailFast
    }
}

impl RetryPolicy {
    /// Retry with the default backoff (100ms base, 5s cap).
    pub fn retry(max_attempts: u32) -> Self {
        RetryPolicy::Retry {
            max_attempts,
            backoff: Backoff::default(),
        }
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, clamped to `cap`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(5),
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Delay before the given retry attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base.saturating_mul(1u32 << exp);
        delay.min(self.cap)
    }
}
