//! Per-run configuration.

use std::time::Duration;

use crate::context::DEFAULT_TRACE_CAP;
use crate::retry::RetryPolicy;
use crate::scheduler::CancelToken;

/// How a join node treats non-success predecessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Any terminal predecessor state (Success, Failed-but-continued,
    /// Skipped) admits the join; routing still requires a satisfied edge
    /// from a successful predecessor. The default.
    AnyTerminal,
    /// A join with any skipped or failed predecessor is itself skipped.
    AllSuccess,
}

/// Options for one `Engine::run` / `Engine::resume` call.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on nodes executing concurrently within a wave.
    pub max_concurrency: usize,
    /// Wall-clock budget for the whole run.
    pub run_timeout: Duration,
    /// Default per-node timeout; `Node::timeout` overrides.
    pub default_node_timeout: Duration,
    /// Default failure policy; `Node::retry` overrides.
    pub default_retry_policy: RetryPolicy,
    /// Capacity of the context trace ring.
    pub trace_cap: usize,
    pub join_policy: JoinPolicy,
    /// Cooperative cancellation; `None` means not cancellable.
    pub cancel: Option<CancelToken>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            run_timeout: Duration::from_secs(300),
            default_node_timeout: Duration::from_secs(30),
            default_retry_policy: RetryPolicy::FailFast,
            trace_cap: DEFAULT_TRACE_CAP,
            join_policy: JoinPolicy::AnyTerminal,
            cancel: None,
        }
    }
}

impl RunOptions {
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn with_default_node_timeout(mut self, timeout: Duration) -> Self {
        self.default_node_timeout = timeout;
        self
    }

    pub fn with_default_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = policy;
        self
    }

    pub fn with_join_policy(mut self, policy: JoinPolicy) -> Self {
        self.join_policy = policy;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
