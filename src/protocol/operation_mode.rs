use num_enum::{IntoPrimitive, TryFromPrimitive};

/// How an operation may be retried and dispatched.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum OperationMode {
    #[default]
    Normal = 0,
    /// Legacy spelling of `Idempotent`, still accepted from older callers.
    Nonmutating = 1,
    Idempotent = 2,
}

impl OperationMode {
    /// Whether an invocation may be repeated after it might have reached
    /// the server.
    pub fn is_idempotent(self) -> bool {
        matches!(self, OperationMode::Idempotent | OperationMode::Nonmutating)
    }
}
