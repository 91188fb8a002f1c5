//! Server side of a slicewire connection.
//!
//! An [`ObjectAdapter`] maps identities (and facets) to [`Servant`]s,
//! decodes incoming requests, resolves the operation against the servant's
//! sorted operation table, runs it, and encodes the reply.

mod current;
pub use current::*;

mod dispatch_output;
pub use dispatch_output::*;

pub mod error;
pub use error::{DispatchError, EndpointError};

mod incoming_request;
pub use incoming_request::*;

mod interceptor;
pub use interceptor::*;

mod object_adapter;
pub use object_adapter::*;

mod servant;
pub use servant::*;

mod servant_locator;
pub use servant_locator::*;

mod with_servants_trait;
pub use with_servants_trait::*;
