use slicewire::message::ProtocolError;
use slicewire::slicing::UserException;
use slicewire::stream::{Identity, StreamError};
use thiserror::Error;

/// What a servant may fail with. Each variant maps onto one reply status;
/// nothing beyond the variant's own text crosses the wire.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A user exception. Sent with its slices when the operation declares
    /// it, otherwise as an unknown user exception carrying its type id.
    #[error("user exception: {0}")]
    User(Box<dyn UserException>),

    #[error("object does not exist")]
    ObjectNotExist,

    #[error("facet does not exist")]
    FacetNotExist,

    #[error("operation does not exist")]
    OperationNotExist,

    #[error(transparent)]
    Marshal(#[from] StreamError),

    /// A local failure whose message is safe to send.
    #[error("{0}")]
    Local(String),

    #[error("{0}")]
    Unknown(String),
}

impl DispatchError {
    pub fn user(exception: impl UserException) -> Self {
        DispatchError::User(Box::new(exception))
    }
}

/// Adapter-level failures: registration problems and connection-level
/// protocol faults.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("a servant is already registered for `{identity}` facet `{facet}`")]
    ServantExists { identity: Identity, facet: String },

    #[error("a default servant is already registered for category `{0}`")]
    DefaultServantExists(String),

    #[error("a servant locator is already registered for category `{0}`")]
    LocatorExists(String),

    #[error("object adapter `{0}` is deactivated")]
    Deactivated(String),

    #[error("operations of servant `{0}` are not sorted by name")]
    UnsortedOperations(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The peer sent a close-connection message.
    #[error("connection closed by peer")]
    ClosedByPeer,
}
