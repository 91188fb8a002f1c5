use slicewire::protocol::Encapsulation;
use slicewire::stream::{OutputStream, StreamError};
use std::fmt;

/// Writes results straight into the reply message.
pub type MarshalFn = Box<dyn FnOnce(&mut OutputStream) -> Result<(), StreamError> + Send>;

/// Successful result of a dispatch.
pub enum DispatchOutput {
    /// Results already encoded into their own encapsulation.
    Buffered(Encapsulation),
    /// Results written in place while the reply is built, skipping the
    /// intermediate encapsulation. Produces the same bytes as `Buffered`.
    Marshaled(MarshalFn),
}

impl DispatchOutput {
    /// No results.
    pub fn empty() -> Self {
        DispatchOutput::Buffered(Encapsulation::empty())
    }

    pub fn buffered<F>(write: F) -> Result<Self, StreamError>
    where
        F: FnOnce(&mut OutputStream) -> Result<(), StreamError>,
    {
        Encapsulation::build(write).map(DispatchOutput::Buffered)
    }

    pub fn marshaled<F>(write: F) -> Self
    where
        F: FnOnce(&mut OutputStream) -> Result<(), StreamError> + Send + 'static,
    {
        DispatchOutput::Marshaled(Box::new(write))
    }
}

impl fmt::Debug for DispatchOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchOutput::Buffered(results) => f.debug_tuple("Buffered").field(results).finish(),
            DispatchOutput::Marshaled(_) => f.write_str("Marshaled(..)"),
        }
    }
}
