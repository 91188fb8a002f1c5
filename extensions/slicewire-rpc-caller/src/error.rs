use slicewire::message::ProtocolError;
use slicewire::protocol::RequestFailed;
use slicewire::slicing::UserException;
use slicewire::stream::StreamError;
use std::time::Duration;
use thiserror::Error;

/// Failures a transport reports while handing bytes to the network.
///
/// A `TransportError` always means the bytes did not leave this process, so
/// the request is safe to retry regardless of its operation mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    #[error("send failed: {0}")]
    Send(String),
}

/// Everything an invocation can end with besides a successful result.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// A user exception declared by the operation.
    #[error("user exception: {0}")]
    UserException(Box<dyn UserException>),

    /// A user exception the operation does not declare, or one the server
    /// could not marshal. Carries the type id (or the server's message).
    #[error("unknown user exception `{0}`")]
    UnknownUserException(String),

    #[error("object `{}` does not exist", .0.identity)]
    ObjectNotExist(RequestFailed),

    #[error("facet `{}` of object `{}` does not exist", .0.facet, .0.identity)]
    FacetNotExist(RequestFailed),

    #[error("operation `{}` does not exist on object `{}`", .0.operation, .0.identity)]
    OperationNotExist(RequestFailed),

    #[error("unknown local exception: {0}")]
    UnknownLocalException(String),

    #[error("unknown exception: {0}")]
    UnknownException(String),

    /// The request never left this process.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The connection went away after the request was sent.
    #[error("connection lost")]
    ConnectionLost,

    /// Every retry allowed by the policy failed.
    #[error("connection failed after {attempts} attempts: {reason}")]
    ConnectionFailed { attempts: usize, reason: String },

    #[error("invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("invocation cancelled")]
    Cancelled,

    #[error("proxy has no connections")]
    NoConnections,

    #[error("request id {0} is still awaiting a reply")]
    RequestIdInUse(i32),

    #[error("failed to marshal parameters: {0}")]
    Marshal(StreamError),

    #[error("failed to decode reply: {0}")]
    Decode(StreamError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl InvocationError {
    /// The declared user exception, if this is one of type `T`.
    pub fn user_exception<T: UserException>(&self) -> Option<&T> {
        match self {
            InvocationError::UserException(exception) => exception.downcast_ref::<T>(),
            _ => None,
        }
    }
}
