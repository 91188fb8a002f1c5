//! Runtime core for IDL-driven RPC.
//!
//! The crate is runtime agnostic: it owns the binary encoding (`stream`),
//! the slice-aware value and exception model (`slicing`), deferred
//! reference resolution for object graphs (`patch`), the request/reply
//! frames (`protocol`) and the framed message layer (`message`).
//! Invocation and dispatch pipelines live in the `slicewire-rpc-caller`
//! and `slicewire-rpc-endpoint` extension crates.

pub mod constants;
pub mod message;
pub mod patch;
pub mod protocol;
pub mod slicing;
pub mod stream;
