use crate::{DispatchError, DispatchOutput, IncomingRequest};
use slicewire::protocol::{OperationInfo, OperationMode};

/// Server-side implementation of one interface.
///
/// Generated skeletons implement this by matching on the operation name
/// and decoding parameters from the [`IncomingRequest`].
#[async_trait::async_trait]
pub trait Servant: Send + Sync {
    /// Type ids this servant implements, most-derived first.
    fn type_ids(&self) -> &[&'static str];

    /// Every operation the servant answers, pseudo-operations included,
    /// strictly sorted by name.
    fn operations(&self) -> &[OperationInfo];

    /// Runs a user operation. Pseudo-operations are answered by the adapter
    /// and never reach this method.
    async fn dispatch(&self, request: IncomingRequest) -> Result<DispatchOutput, DispatchError>;

    fn most_derived_type_id(&self) -> &'static str {
        self.type_ids().first().copied().unwrap_or_default()
    }

    fn find_operation(&self, name: &str) -> Option<&OperationInfo> {
        let operations = self.operations();
        operations
            .binary_search_by(|operation| operation.name.cmp(name))
            .ok()
            .map(|index| &operations[index])
    }
}

/// Rejects a request whose mode the declared operation does not accept.
/// Nonmutating is the legacy spelling of Idempotent and is accepted for it.
pub fn check_mode(declared: OperationMode, received: OperationMode) -> Result<(), DispatchError> {
    if declared == received
        || (declared == OperationMode::Idempotent && received == OperationMode::Nonmutating)
    {
        return Ok(());
    }
    Err(DispatchError::Local(format!(
        "operation mode mismatch: declared {declared:?}, received {received:?}"
    )))
}
