use crate::{DispatchError, DispatchOutput, IncomingRequest, Servant};
use slicewire::protocol::OperationInfo;
use std::sync::Arc;

/// Sees each user request before the target servant. It may answer on
/// its own or forward to `next`.
#[async_trait::async_trait]
pub trait DispatchInterceptor: Send + Sync {
    async fn intercept(
        &self,
        request: IncomingRequest,
        next: &dyn Servant,
    ) -> Result<DispatchOutput, DispatchError>;
}

/// A servant whose dispatches go through an interceptor first.
pub struct InterceptedServant {
    servant: Arc<dyn Servant>,
    interceptor: Arc<dyn DispatchInterceptor>,
}

impl InterceptedServant {
    pub fn new(servant: Arc<dyn Servant>, interceptor: Arc<dyn DispatchInterceptor>) -> Self {
        Self {
            servant,
            interceptor,
        }
    }
}

#[async_trait::async_trait]
impl Servant for InterceptedServant {
    fn type_ids(&self) -> &[&'static str] {
        self.servant.type_ids()
    }

    fn operations(&self) -> &[OperationInfo] {
        self.servant.operations()
    }

    async fn dispatch(&self, request: IncomingRequest) -> Result<DispatchOutput, DispatchError> {
        self.interceptor
            .intercept(request, self.servant.as_ref())
            .await
    }
}
