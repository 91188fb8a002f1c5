use crate::Servant;
use slicewire::stream::Identity;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

/// Identity, then facet, to servant.
pub type ServantMap = HashMap<Identity, HashMap<String, Arc<dyn Servant>>>;

/// Closure-passing access to a [`ServantMap`] behind either a
/// `tokio::sync::Mutex` or a `std::sync::Mutex`, so adapter code does not
/// depend on the lock's guard type.
#[async_trait::async_trait]
pub trait WithServants: Send + Sync {
    async fn with_servants<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ServantMap) -> R + Send,
        R: Send;
}

#[cfg(feature = "tokio_support")]
#[async_trait::async_trait]
impl WithServants for tokio::sync::Mutex<ServantMap> {
    async fn with_servants<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ServantMap) -> R + Send,
        R: Send,
    {
        let mut guard = self.lock().await;
        f(&mut guard)
    }
}

#[async_trait::async_trait]
impl WithServants for std::sync::Mutex<ServantMap> {
    async fn with_servants<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut ServantMap) -> R + Send,
        R: Send,
    {
        let mut guard = self.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
