//! Bindings for a small `::Test` module, written the way an IDL compiler
//! would emit them: classes and exceptions with static slice tables, and
//! the `Echo` interface with a typed proxy and a servant skeleton.
//!
//! ```text
//! module Test {
//!     class Node { int value; Node next; }
//!     class Base { string name; }
//!     ["preserve-slice"] class Derived extends Base { int extra; optional(1) string note; }
//!     class MoreDerived extends Derived { long level; Node link; }
//!
//!     exception BaseError { string reason; }
//!     exception DerivedError extends BaseError { int code; }
//!     exception UndeclaredError { string detail; }
//!
//!     interface Echo { ... }
//! }
//! ```

mod classes;
pub use classes::*;

mod echo;
pub use echo::*;

mod echo_impl;
pub use echo_impl::*;

mod exceptions;
pub use exceptions::*;

pub mod loopback;

use slicewire::slicing::TypeRegistry;

/// Registers every class and exception of the module.
pub fn register_types(registry: &mut TypeRegistry) -> &mut TypeRegistry {
    registry
        .register_class::<Node>()
        .register_class::<Base>()
        .register_class::<Derived>()
        .register_class::<MoreDerived>()
        .register_exception::<BaseError>()
        .register_exception::<DerivedError>()
        .register_exception::<UndeclaredError>()
}
