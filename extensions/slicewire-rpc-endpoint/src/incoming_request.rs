use crate::{Current, DispatchError};
use slicewire::protocol::Encapsulation;
use slicewire::slicing::TypeRegistry;
use slicewire::stream::{InputStream, StreamConfig, StreamError};
use std::sync::Arc;

/// A request handed to [`Servant::dispatch`](crate::Servant::dispatch):
/// the call's [`Current`] plus its still-encoded parameters.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub current: Current,
    params: Encapsulation,
    registry: Arc<TypeRegistry>,
    stream_config: StreamConfig,
}

impl IncomingRequest {
    pub fn new(
        current: Current,
        params: Encapsulation,
        registry: Arc<TypeRegistry>,
        stream_config: StreamConfig,
    ) -> Self {
        Self {
            current,
            params,
            registry,
            stream_config,
        }
    }

    pub fn params(&self) -> &Encapsulation {
        &self.params
    }

    /// Decodes the parameters. `read` must consume the encapsulation
    /// exactly: required parameters in declaration order, then optional
    /// ones by tag, then the instance section if there is one.
    pub fn read_params<T, F>(&self, read: F) -> Result<T, DispatchError>
    where
        F: FnOnce(&mut InputStream<'_>) -> Result<T, StreamError>,
    {
        Ok(self
            .params
            .decode(Some(&self.registry), self.stream_config, read)?)
    }

    /// For operations without parameters. Optional members a newer caller
    /// added are skipped when the encapsulation is closed.
    pub fn read_empty_params(&self) -> Result<(), DispatchError> {
        self.read_params(|_| Ok(()))
    }
}
