use crate::{Current, DispatchError, Servant};
use std::sync::Arc;

/// Supplies servants on demand for one identity category.
///
/// The adapter consults a locator only after the active servant map and
/// the default servants miss. The locator registered for the identity's
/// category goes first, then the one registered for the empty category.
#[async_trait::async_trait]
pub trait ServantLocator: Send + Sync {
    /// Returns the servant for `current`, or `None` when this locator has
    /// nothing for it. An error is sent back as the request's reply.
    async fn locate(&self, current: &Current) -> Result<Option<Arc<dyn Servant>>, DispatchError>;

    /// Runs after a located servant has dispatched the request.
    async fn finished(&self, _current: &Current, _servant: &Arc<dyn Servant>) {}

    /// Runs once when the adapter deactivates.
    fn deactivate(&self, _category: &str) {}
}
