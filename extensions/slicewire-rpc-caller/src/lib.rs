//! Client side of a slicewire connection.
//!
//! A [`ClientConnection`] owns the per-connection state (request ids, the
//! pending-reply table, the incoming message decoder and the batch queue)
//! and talks to the network through an [`RpcTransport`]. [`Proxy`] builds
//! requests against one or more connections and turns replies back into
//! typed results or [`InvocationError`]s.

mod batch_request_interceptor;
pub use batch_request_interceptor::*;

mod client_connection;
pub use client_connection::*;

pub mod error;
pub use error::{InvocationError, TransportError};

mod invocation_config;
pub use invocation_config::*;

mod invocation_handle;
pub use invocation_handle::*;

mod pending_reply;
pub use pending_reply::*;

mod proxy;
pub use proxy::*;

mod retry_policy;
pub use retry_policy::*;

mod transport;
pub use transport::*;
