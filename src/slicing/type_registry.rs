use crate::slicing::{ClassType, ExceptionType, UserException, Value};
use std::collections::HashMap;

pub type ValueFactory = fn() -> Box<dyn Value>;
pub type ExceptionFactory = fn() -> Box<dyn UserException>;

/// Maps type ids to factories for the classes and exceptions a process
/// knows about.
///
/// The registry is built once (typically by the generated
/// `register_types` functions) and handed to input streams explicitly; a
/// type that is not registered is sliced when decoded.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    values: HashMap<String, ValueFactory>,
    compact_ids: HashMap<i32, String>,
    exceptions: HashMap<String, ExceptionFactory>,
}

fn create_value<T: ClassType>() -> Box<dyn Value> {
    Box::new(T::default())
}

fn create_exception<T: ExceptionType>() -> Box<dyn UserException> {
    Box::new(T::default())
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a class under its most-derived type id (and compact id,
    /// if it declares one).
    pub fn register_class<T: ClassType>(&mut self) -> &mut Self {
        if let Some(slice) = T::SLICES.first() {
            self.register_value_factory(slice.type_id, slice.compact_id, create_value::<T>);
        }
        self
    }

    pub fn register_value_factory(
        &mut self,
        type_id: &str,
        compact_id: Option<i32>,
        factory: ValueFactory,
    ) -> &mut Self {
        if let Some(compact_id) = compact_id {
            self.compact_ids.insert(compact_id, type_id.to_string());
        }
        self.values.insert(type_id.to_string(), factory);
        self
    }

    pub fn register_exception<T: ExceptionType>(&mut self) -> &mut Self {
        if let Some(slice) = T::SLICES.first() {
            self.exceptions
                .insert(slice.type_id.to_string(), create_exception::<T>);
        }
        self
    }

    pub fn value_factory(&self, type_id: &str) -> Option<ValueFactory> {
        self.values.get(type_id).copied()
    }

    pub fn exception_factory(&self, type_id: &str) -> Option<ExceptionFactory> {
        self.exceptions.get(type_id).copied()
    }

    pub fn type_id_for_compact_id(&self, compact_id: i32) -> Option<&str> {
        self.compact_ids.get(&compact_id).map(String::as_str)
    }

    pub fn knows_value(&self, type_id: &str) -> bool {
        self.values.contains_key(type_id)
    }

    pub fn knows_exception(&self, type_id: &str) -> bool {
        self.exceptions.contains_key(type_id)
    }
}
