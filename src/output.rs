//! The `Output` trait: the write half of the field-visiting contract.
//!
//! A [`crate::schema::Schema`] receives an `Output` and calls one method per
//! present field. The two implementations are [`crate::BufferedOutput`]
//! (plain tree encoding) and [`crate::graph::GraphOutput`] (reference
//! tracking layered on top). Dispatch is static; schemas are generic over
//! the output type.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;

use crate::error::Result;
use crate::schema::Schema;

/// Sink for encoded fields.
///
/// The `repeated` flag mirrors the field's declaration; the binary wire
/// format does not distinguish repeated elements, but alternative outputs
/// (and schemas) rely on the flag being passed through faithfully.
pub trait Output {
    /// Writes an `int32` field. Negative values are sign-extended to 64
    /// bits and occupy ten bytes, preserving cross-width compatibility.
    fn write_int32(&mut self, field_number: u32, value: i32, repeated: bool) -> Result<()>;

    /// Writes a `uint32` field.
    fn write_uint32(&mut self, field_number: u32, value: u32, repeated: bool) -> Result<()>;

    /// Writes a zigzag-encoded `sint32` field.
    fn write_sint32(&mut self, field_number: u32, value: i32, repeated: bool) -> Result<()>;

    /// Writes a `fixed32` field.
    fn write_fixed32(&mut self, field_number: u32, value: u32, repeated: bool) -> Result<()>;

    /// Writes an `sfixed32` field.
    fn write_sfixed32(&mut self, field_number: u32, value: i32, repeated: bool) -> Result<()>;

    /// Writes a `float` field as its raw little-endian bit pattern.
    fn write_float(&mut self, field_number: u32, value: f32, repeated: bool) -> Result<()>;

    /// Writes an `int64` field.
    fn write_int64(&mut self, field_number: u32, value: i64, repeated: bool) -> Result<()>;

    /// Writes a `uint64` field.
    fn write_uint64(&mut self, field_number: u32, value: u64, repeated: bool) -> Result<()>;

    /// Writes a zigzag-encoded `sint64` field.
    fn write_sint64(&mut self, field_number: u32, value: i64, repeated: bool) -> Result<()>;

    /// Writes a `fixed64` field.
    fn write_fixed64(&mut self, field_number: u32, value: u64, repeated: bool) -> Result<()>;

    /// Writes an `sfixed64` field.
    fn write_sfixed64(&mut self, field_number: u32, value: i64, repeated: bool) -> Result<()>;

    /// Writes a `double` field as its raw little-endian bit pattern.
    fn write_double(&mut self, field_number: u32, value: f64, repeated: bool) -> Result<()>;

    /// Writes a `bool` field.
    fn write_bool(&mut self, field_number: u32, value: bool, repeated: bool) -> Result<()>;

    /// Writes an enum field by its numeric value.
    fn write_enum(&mut self, field_number: u32, value: i32, repeated: bool) -> Result<()> {
        self.write_int32(field_number, value, repeated)
    }

    /// Writes a string field.
    fn write_string(&mut self, field_number: u32, value: &str, repeated: bool) -> Result<()>;

    /// Writes a bytes field from a shared buffer.
    ///
    /// Payloads above the inline threshold are spliced into the output as
    /// read-only segments without copying.
    fn write_bytes(&mut self, field_number: u32, value: &Bytes, repeated: bool) -> Result<()>;

    /// Writes a bytes field from a borrowed slice (always copied).
    fn write_byte_array(&mut self, field_number: u32, value: &[u8], repeated: bool) -> Result<()>;

    /// Writes a nested message as a length-delimited field.
    ///
    /// The length prefix is computed after the body has been encoded; see
    /// [`crate::BufferedOutput`] for the deferred-splice algorithm.
    fn write_message<T, S: Schema<T>>(
        &mut self,
        field_number: u32,
        message: &T,
        schema: &S,
        repeated: bool,
    ) -> Result<()>;

    /// Writes a graph-shared message field.
    ///
    /// Under [`crate::graph::GraphOutput`] the instance's identity is
    /// tracked and repeat encounters emit a compact back-reference; under a
    /// plain output this is an ordinary nested message. Graphs with cycles
    /// must be written through a graph output.
    fn write_graph_message<T: 'static, S: Schema<T>>(
        &mut self,
        field_number: u32,
        message: &Rc<RefCell<T>>,
        schema: &S,
        repeated: bool,
    ) -> Result<()>
    where
        Self: Sized,
    {
        let inner = message.borrow();
        self.write_message(field_number, &*inner, schema, repeated)
    }
}
