use crate::RetryPolicy;
use std::time::Duration;

pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(60);

/// How a proxy sends its requests.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum InvocationKind {
    /// Wait for a reply.
    #[default]
    TwoWay,
    /// Send with request id 0; complete as soon as the bytes are handed to
    /// the transport.
    Oneway,
    /// Queue on the connection until the next batch flush.
    BatchOneway,
}

impl InvocationKind {
    /// Wire value used when a proxy is marshaled.
    pub fn as_wire_mode(self) -> u8 {
        match self {
            InvocationKind::TwoWay => 0,
            InvocationKind::Oneway => 1,
            InvocationKind::BatchOneway => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationConfig {
    /// Per-attempt reply timeout; `None` waits forever.
    pub timeout: Option<Duration>,
    pub retry_policy: RetryPolicy,
    pub invocation_kind: InvocationKind,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_INVOCATION_TIMEOUT),
            retry_policy: RetryPolicy::default(),
            invocation_kind: InvocationKind::TwoWay,
        }
    }
}

impl InvocationConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_invocation_kind(mut self, invocation_kind: InvocationKind) -> Self {
        self.invocation_kind = invocation_kind;
        self
    }
}
