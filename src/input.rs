//! The `Input` trait: the read half of the field-visiting contract.
//!
//! Implementations are [`crate::BytesInput`] (in-memory, zero-copy) and
//! [`crate::StreamInput`] (read-ahead buffered stream), plus the
//! reference-tracking wrapper [`crate::graph::GraphInput`]. The trait keeps
//! a small primitive core and derives everything else through default
//! methods, so all three share one decoding path.
//!
//! ## Limits
//!
//! Entering a nested length-delimited region pushes a limit equal to the
//! declared length; reads past the limit fail with
//! [`crate::GraphbufError::Truncated`] and the limit is popped on return.
//! The limit stack itself lives on the call stack: [`Input::push_limit`]
//! returns the previous limit and [`Input::pop_limit`] restores it.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;

use crate::error::{GraphbufError, Result};
use crate::schema::Schema;
use crate::wire::{self, WireType};

/// Cursor over an encoded message.
pub trait Input {
    /// Reads the next field tag, or `0` once the current bound (EOF or the
    /// innermost limit) is reached.
    ///
    /// A tag with field number zero is rejected as
    /// [`crate::GraphbufError::InvalidTag`].
    fn read_tag(&mut self) -> Result<u32>;

    /// Verifies the last tag read was `expected`.
    ///
    /// Called with `0` after a merge to confirm the message ended exactly
    /// at its declared bound.
    fn check_last_tag_was(&self, expected: u32) -> Result<()>;

    /// Reads a varint, returning its low 32 bits.
    ///
    /// Up to ten bytes are consumed so sign-extended 64-bit encodings of
    /// negative 32-bit values decode correctly.
    fn read_varint32(&mut self) -> Result<u32>;

    /// Reads a full 64-bit varint.
    fn read_varint64(&mut self) -> Result<u64>;

    /// Reads a little-endian 4-byte value.
    fn read_fixed32(&mut self) -> Result<u32>;

    /// Reads a little-endian 8-byte value.
    fn read_fixed64(&mut self) -> Result<u64>;

    /// Reads a length-delimited payload.
    ///
    /// The declared length is validated against [`Input::size_limit`]
    /// before any allocation. In-memory sources return a zero-copy view.
    fn read_bytes(&mut self) -> Result<Bytes>;

    /// Discards exactly `count` payload bytes.
    fn skip_raw_bytes(&mut self, count: usize) -> Result<()>;

    /// Restricts reading to the next `byte_count` bytes, returning the
    /// previous limit for [`Input::pop_limit`].
    fn push_limit(&mut self, byte_count: usize) -> Result<usize>;

    /// Restores a limit returned by [`Input::push_limit`].
    fn pop_limit(&mut self, old_limit: usize);

    /// The configured ceiling for declared lengths.
    fn size_limit(&self) -> usize;

    // --- derived reads -------------------------------------------------

    /// Reads an `int32` field value.
    fn read_int32(&mut self) -> Result<i32> {
        Ok(self.read_varint64()? as i32)
    }

    /// Reads a `uint32` field value.
    fn read_uint32(&mut self) -> Result<u32> {
        self.read_varint32()
    }

    /// Reads a zigzag-encoded `sint32` field value.
    fn read_sint32(&mut self) -> Result<i32> {
        Ok(wire::zigzag_decode32(self.read_varint32()?))
    }

    /// Reads an `sfixed32` field value.
    fn read_sfixed32(&mut self) -> Result<i32> {
        Ok(self.read_fixed32()? as i32)
    }

    /// Reads a `float` field value from its raw bit pattern.
    fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_fixed32()?))
    }

    /// Reads an `int64` field value.
    fn read_int64(&mut self) -> Result<i64> {
        Ok(self.read_varint64()? as i64)
    }

    /// Reads a `uint64` field value.
    fn read_uint64(&mut self) -> Result<u64> {
        self.read_varint64()
    }

    /// Reads a zigzag-encoded `sint64` field value.
    fn read_sint64(&mut self) -> Result<i64> {
        Ok(wire::zigzag_decode64(self.read_varint64()?))
    }

    /// Reads an `sfixed64` field value.
    fn read_sfixed64(&mut self) -> Result<i64> {
        Ok(self.read_fixed64()? as i64)
    }

    /// Reads a `double` field value from its raw bit pattern.
    fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.read_fixed64()?))
    }

    /// Reads a `bool` field value.
    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_varint64()? != 0)
    }

    /// Reads an enum field's numeric value.
    fn read_enum(&mut self) -> Result<i32> {
        self.read_int32()
    }

    /// Reads a string field, validating UTF-8.
    fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(Vec::from(bytes)).map_err(|_| GraphbufError::InvalidUtf8)
    }

    /// Consumes exactly the bytes implied by `tag`'s wire type.
    ///
    /// Required so an unrecognized field number does not desynchronize
    /// subsequent parsing. Unknown wire types fail instead of guessing.
    fn skip_field(&mut self, tag: u32) -> Result<()> {
        match WireType::of_tag(tag)? {
            WireType::Varint => {
                self.read_varint64()?;
            }
            WireType::Fixed64 => self.skip_raw_bytes(wire::FIXED_64_SIZE)?,
            WireType::LengthDelimited => {
                let len = self.read_varint32()? as usize;
                self.skip_raw_bytes(len)?;
            }
            WireType::Fixed32 => self.skip_raw_bytes(wire::FIXED_32_SIZE)?,
        }
        Ok(())
    }

    /// Merges a nested length-delimited message into `message`.
    ///
    /// Reads the declared length, guards it against the size limit, pushes
    /// it as the new bound, lets the schema consume the body, verifies the
    /// end sentinel and restores the previous bound.
    fn merge_message<T, S: Schema<T>>(&mut self, message: &mut T, schema: &S) -> Result<()>
    where
        Self: Sized,
    {
        let len = self.read_varint32()? as usize;
        if len > self.size_limit() {
            return Err(GraphbufError::SizeLimitExceeded {
                declared: len,
                limit: self.size_limit(),
            });
        }
        let old_limit = self.push_limit(len)?;
        schema.merge_from(self, message)?;
        self.check_last_tag_was(0)?;
        self.pop_limit(old_limit);
        Ok(())
    }

    /// Reads a graph-shared message field.
    ///
    /// Under [`crate::graph::GraphInput`], a varint-typed marker resolves
    /// to an already-materialized instance and a length-delimited body
    /// constructs a fresh one, registering it before its fields are merged.
    /// Under a plain input only fresh bodies are valid.
    fn merge_graph_message<T: 'static, S: Schema<T>>(
        &mut self,
        tag: u32,
        schema: &S,
    ) -> Result<Rc<RefCell<T>>>
    where
        Self: Sized,
    {
        if WireType::of_tag(tag)? != WireType::LengthDelimited {
            return Err(GraphbufError::Graph(format!(
                "reference marker for field {} outside graph mode",
                wire::tag_field_number(tag)
            )));
        }
        let message = Rc::new(RefCell::new(schema.new_message()));
        {
            let mut inner = message.borrow_mut();
            self.merge_message(&mut *inner, schema)?;
        }
        Ok(message)
    }
}
