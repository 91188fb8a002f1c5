use crate::slicing::SliceDescriptor;
use crate::stream::{InputStream, OutputStream, StreamError};
use std::any::Any;
use std::fmt;

/// An application-declared exception that can be marshaled into a reply.
///
/// Exceptions are encoded like class instances but always use string type
/// ids, carry no class members, and never preserve unknown slices.
pub trait UserException: Any + fmt::Debug + fmt::Display + Send + Sync {
    /// Most-derived type id.
    fn exception_type_id(&self) -> &'static str;

    /// Type ids of the whole chain, most-derived first.
    fn exception_type_ids(&self) -> Vec<&'static str>;

    fn write_exception_slices(&self, os: &mut OutputStream) -> Result<(), StreamError>;

    fn read_exception_slices(&mut self, is: &mut InputStream<'_>) -> Result<(), StreamError>;

    fn as_any(&self) -> &dyn Any;
}

impl dyn UserException {
    pub fn is<T: UserException>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: UserException>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Whether the exception is, or derives from, `type_id`.
    pub fn is_a(&self, type_id: &str) -> bool {
        self.exception_type_ids().iter().any(|id| *id == type_id)
    }
}

/// Static description of a generated exception.
pub trait ExceptionType: Default + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// One descriptor per slice, most-derived first. Must not be empty.
    const SLICES: &'static [SliceDescriptor<Self>];
}

impl<T: ExceptionType> UserException for T {
    fn exception_type_id(&self) -> &'static str {
        T::SLICES.first().map(|slice| slice.type_id).unwrap_or_default()
    }

    fn exception_type_ids(&self) -> Vec<&'static str> {
        T::SLICES.iter().map(|slice| slice.type_id).collect()
    }

    fn write_exception_slices(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_described_slices(self, T::SLICES)
    }

    fn read_exception_slices(&mut self, is: &mut InputStream<'_>) -> Result<(), StreamError> {
        is.read_described_slices(self, T::SLICES)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Result of decoding an exception from a reply.
#[derive(Debug)]
pub enum DecodedUserException {
    /// A registered exception type matched one of the slices. `type_id`
    /// is the most-derived id on the wire, which differs from the
    /// exception's own id when derived slices were skipped.
    Known {
        exception: Box<dyn UserException>,
        type_id: String,
    },
    /// No slice was recognised; only the most-derived type id survives.
    Unknown { type_id: String },
}

impl DecodedUserException {
    pub fn type_id(&self) -> &str {
        match self {
            DecodedUserException::Known { type_id, .. }
            | DecodedUserException::Unknown { type_id } => type_id,
        }
    }
}
