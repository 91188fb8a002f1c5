use crate::slicing::{SlicedData, Value};
use crate::stream::{InputStream, OutputStream, StreamError};
use std::any::Any;

/// Stand-in for an instance none of whose slices the receiver knows.
///
/// The most-derived type id is kept, along with every slice when slice
/// preservation is enabled, so the instance can be forwarded unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownSlicedValue {
    unknown_type_id: String,
    sliced_data: SlicedData,
}

impl UnknownSlicedValue {
    pub fn new(unknown_type_id: impl Into<String>, sliced_data: SlicedData) -> Self {
        Self {
            unknown_type_id: unknown_type_id.into(),
            sliced_data,
        }
    }

    pub fn unknown_type_id(&self) -> &str {
        &self.unknown_type_id
    }
}

impl Value for UnknownSlicedValue {
    fn value_type_id(&self) -> &str {
        &self.unknown_type_id
    }

    fn value_type_ids(&self) -> Vec<&str> {
        self.sliced_data.type_ids().collect()
    }

    fn write_value_slices(&self, _os: &mut OutputStream) -> Result<(), StreamError> {
        // All slices were emitted from the preserved data.
        if self.sliced_data.is_empty() {
            return Err(StreamError::Marshal(format!(
                "cannot re-send `{}`: its slices were not preserved",
                self.unknown_type_id
            )));
        }
        Ok(())
    }

    fn read_value_slices(&mut self, _is: &mut InputStream<'_>) -> Result<(), StreamError> {
        Err(StreamError::SliceState(
            "unknown values are only produced by slicing",
        ))
    }

    fn sliced_data(&self) -> Option<&SlicedData> {
        Some(&self.sliced_data)
    }

    fn set_sliced_data(&mut self, data: SlicedData) {
        self.sliced_data = data;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
