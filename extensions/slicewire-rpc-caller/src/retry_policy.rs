use crate::InvocationError;
use slicewire::protocol::OperationMode;
use std::time::Duration;

/// How often, and after which failures, an invocation is repeated.
///
/// Each entry of `intervals` allows one more attempt after waiting that
/// long; the default is a single immediate retry. Failures that happened
/// before the request left this process are always retryable. A connection
/// lost after sending is only retried for idempotent operations, unless
/// `retry_sent_normal` is set. Timeouts, cancellations, user exceptions and
/// decode failures never are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub intervals: Vec<Duration>,
    pub retry_sent_normal: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            intervals: vec![Duration::ZERO],
            retry_sent_normal: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(intervals: Vec<Duration>) -> Self {
        Self {
            intervals,
            retry_sent_normal: false,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_retry_sent_normal(mut self, retry_sent_normal: bool) -> Self {
        self.retry_sent_normal = retry_sent_normal;
        self
    }

    /// Delay before retry number `retry` (0-based), or `None` once the
    /// budget is spent.
    pub fn delay_for(&self, retry: usize) -> Option<Duration> {
        self.intervals.get(retry).copied()
    }

    pub fn allows(&self, error: &InvocationError, mode: OperationMode) -> bool {
        match error {
            InvocationError::Transport(_) => true,
            InvocationError::ConnectionLost => mode.is_idempotent() || self.retry_sent_normal,
            _ => false,
        }
    }
}
