//! The `Schema` trait: the seam between the engine and message types.
//!
//! The engine never inspects message internals. Serialization drives
//! [`Schema::write_to`], which visits every present field in ascending
//! field-number order and calls the matching [`crate::output::Output`]
//! method; deserialization drives [`Schema::merge_from`], which loops
//! reading tags until the end sentinel and dispatches by field number,
//! skipping unknown numbers.
//!
//! Schemas are usually generated with `#[derive(Schema)]` from
//! `graphbuf-derive`, but can be written by hand for full control over the
//! wire representation.

use crate::error::Result;
use crate::input::Input;
use crate::output::Output;

/// Per-message-type serialization capability.
///
/// Implementations are stateless values (typically unit structs); the same
/// schema instance is reused across every write and merge of its message
/// type, so field dispatch is resolved once per schema, not per call.
pub trait Schema<T> {
    /// A stable human-readable name for the message type, used in
    /// diagnostics such as [`crate::GraphbufError::Uninitialized`].
    fn message_name(&self) -> &'static str;

    /// Constructs an empty instance to merge into.
    fn new_message(&self) -> T;

    /// Reports whether all fields marked required are set.
    fn is_initialized(&self, message: &T) -> bool;

    /// Visits every present field of `message` in ascending field-number
    /// order, writing each through `output`.
    fn write_to<O: Output>(&self, output: &mut O, message: &T) -> Result<()>;

    /// Reads tags from `input` until the end sentinel, dispatching each
    /// recognized field number to the matching setter and skipping the
    /// rest.
    fn merge_from<I: Input>(&self, input: &mut I, message: &mut T) -> Result<()>;
}
