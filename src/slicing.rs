mod slice_descriptor;
mod slice_state;
mod sliced_data;
mod type_registry;
mod unknown_sliced_value;
mod user_exception;
mod value;
mod value_graph;

pub use slice_descriptor::SliceDescriptor;
pub use slice_state::{InstanceKind, SliceState};
pub use sliced_data::{SliceInfo, SlicedData};
pub use type_registry::{ExceptionFactory, TypeRegistry, ValueFactory};
pub use unknown_sliced_value::UnknownSlicedValue;
pub use user_exception::{DecodedUserException, ExceptionType, UserException};
pub use value::{ClassType, Value};
pub use value_graph::{ValueGraph, ValueId};
