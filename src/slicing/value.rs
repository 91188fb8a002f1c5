use crate::slicing::{SliceDescriptor, SlicedData};
use crate::stream::{InputStream, OutputStream, StreamError};
use std::any::Any;
use std::fmt;

/// A class instance that can travel through the stream.
///
/// Generated classes implement [`ClassType`] and get this trait through the
/// blanket impl; [`UnknownSlicedValue`](crate::slicing::UnknownSlicedValue)
/// implements it directly.
pub trait Value: Any + fmt::Debug + Send + Sync {
    /// Most-derived type id of the instance.
    fn value_type_id(&self) -> &str;

    /// Type ids of every slice the instance carries, most-derived first.
    fn value_type_ids(&self) -> Vec<&str>;

    /// Writes every known slice, most-derived first. Preserved slices are
    /// emitted by the stream before this is called.
    fn write_value_slices(&self, os: &mut OutputStream) -> Result<(), StreamError>;

    fn read_value_slices(&mut self, is: &mut InputStream<'_>) -> Result<(), StreamError>;

    fn sliced_data(&self) -> Option<&SlicedData>;

    /// Attaches slices that were skipped while decoding. Types that do not
    /// preserve slices drop them.
    fn set_sliced_data(&mut self, data: SlicedData);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Value {
    pub fn is<T: Value>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Value>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Static description of a generated class.
pub trait ClassType: Default + fmt::Debug + Send + Sync + 'static {
    /// One descriptor per slice, most-derived first. Must not be empty.
    const SLICES: &'static [SliceDescriptor<Self>];

    /// Storage for slices this type did not recognise while decoding.
    /// Returning `None` means the type does not preserve them.
    fn sliced_data_slot(&mut self) -> Option<&mut Option<SlicedData>> {
        None
    }

    fn preserved_slices(&self) -> Option<&SlicedData> {
        None
    }
}

impl<T: ClassType> Value for T {
    fn value_type_id(&self) -> &str {
        T::SLICES.first().map(|slice| slice.type_id).unwrap_or_default()
    }

    fn value_type_ids(&self) -> Vec<&str> {
        let preserved = self.preserved_slices().into_iter().flat_map(SlicedData::type_ids);
        preserved.chain(T::SLICES.iter().map(|slice| slice.type_id)).collect()
    }

    fn write_value_slices(&self, os: &mut OutputStream) -> Result<(), StreamError> {
        os.write_described_slices(self, T::SLICES)
    }

    fn read_value_slices(&mut self, is: &mut InputStream<'_>) -> Result<(), StreamError> {
        is.read_described_slices(self, T::SLICES)
    }

    fn sliced_data(&self) -> Option<&SlicedData> {
        self.preserved_slices()
    }

    fn set_sliced_data(&mut self, data: SlicedData) {
        if let Some(slot) = self.sliced_data_slot() {
            *slot = Some(data);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
