use slicewire::protocol::OperationMode;
use slicewire::stream::{Context, Identity};

/// Information about the request being dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Current {
    pub adapter: String,
    pub identity: Identity,
    pub facet: String,
    pub operation: String,
    /// Mode the caller sent, which may differ from the declared one.
    pub mode: OperationMode,
    pub context: Context,
    /// 0 for oneway and batch requests.
    pub request_id: i32,
}

impl Current {
    pub fn is_oneway(&self) -> bool {
        self.request_id == 0
    }
}
