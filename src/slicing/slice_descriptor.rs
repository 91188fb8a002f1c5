use crate::stream::{InputStream, OutputStream, StreamError};
use std::fmt;

/// One slice of a class or exception hierarchy: the members a single type
/// in the chain contributes.
///
/// Generated code lists these most-derived first in
/// [`ClassType::SLICES`](crate::slicing::ClassType::SLICES) or
/// [`ExceptionType::SLICES`](crate::slicing::ExceptionType::SLICES).
pub struct SliceDescriptor<T> {
    pub type_id: &'static str,
    /// Compact numeric id, used instead of the string for classes that
    /// declare one. Ignored for exceptions.
    pub compact_id: Option<i32>,
    pub write_members: fn(&T, &mut OutputStream) -> Result<(), StreamError>,
    pub read_members: fn(&mut T, &mut InputStream<'_>) -> Result<(), StreamError>,
}

impl<T> fmt::Debug for SliceDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceDescriptor")
            .field("type_id", &self.type_id)
            .field("compact_id", &self.compact_id)
            .finish()
    }
}
