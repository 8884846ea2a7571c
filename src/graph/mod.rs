//! Graph mode: serialization of object graphs with shared references and
//! cycles.
//!
//! Tree-mode encoding visits every instance it reaches; on a graph with
//! sharing that duplicates data, and on a cycle it never terminates. Graph
//! mode wraps the engine with a per-call reference table keyed by object
//! identity: the first encounter of an [`Rc<RefCell<T>>`] instance encodes
//! it as an ordinary nested message, every later encounter encodes only a
//! small integer id.
//!
//! ## Wire format
//!
//! A fresh object is indistinguishable from tree mode: the field's tag with
//! the length-delimited wire type, then the encoded body. A back-reference
//! reuses the *same field number* with the varint wire type, carrying the
//! reference id. The wire type alone disambiguates the two on decode, so a
//! graph without shared references is byte-identical to tree mode and a
//! legitimate zero-length nested message can never be mistaken for a
//! back-reference.
//!
//! Ids are dense, start at 1 (the top-level object), and are assigned in
//! first-encounter order; the decoder reconstructs the same numbering by
//! registering each instance before merging its fields. Reference tables
//! are scoped to one top-level call and never reused.
//!
//! ## Example
//!
//! ```rust,ignore
//! let a = Rc::new(RefCell::new(Node::default()));
//! let b = Rc::new(RefCell::new(Node::default()));
//! a.borrow_mut().next = Some(b.clone());
//! b.borrow_mut().next = Some(a.clone()); // a cycle
//!
//! let bytes = graph::to_vec(&a, &NodeSchema)?;
//! let restored = Rc::new(RefCell::new(Node::default()));
//! graph::merge_from(&bytes, &restored, &NodeSchema)?;
//! ```

mod input;
mod output;

pub use input::GraphInput;
pub use output::GraphOutput;

use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;

use bytes::Bytes;

use crate::buffer::BufferedOutput;
use crate::error::{GraphbufError, Result};
use crate::input::Input;
use crate::io::check_initialized;
use crate::reader::BytesInput;
use crate::schema::Schema;
use crate::stream::StreamInput;
use crate::wire::{self, MAX_VARINT_SIZE};

/// Serializes a graph rooted at `message` into a fresh byte vector.
pub fn to_vec<T: 'static, S: Schema<T>>(message: &Rc<RefCell<T>>, schema: &S) -> Result<Vec<u8>> {
    let mut buffer = BufferedOutput::new();
    write_graph(&mut buffer, message, schema)?;
    buffer.to_vec()
}

/// Serializes a graph through a caller-supplied reusable buffer.
pub fn to_vec_with<T: 'static, S: Schema<T>>(
    buffer: &mut BufferedOutput,
    message: &Rc<RefCell<T>>,
    schema: &S,
) -> Result<Vec<u8>> {
    check_fresh(buffer)?;
    write_graph(buffer, message, schema)?;
    buffer.to_vec()
}

/// Serializes a graph into `writer`, returning the byte count.
pub fn stream_to<W: Write, T: 'static, S: Schema<T>>(
    writer: &mut W,
    message: &Rc<RefCell<T>>,
    schema: &S,
    buffer: &mut BufferedOutput,
) -> Result<usize> {
    check_fresh(buffer)?;
    write_graph(buffer, message, schema)?;
    buffer.stream_to(writer)
}

/// Serializes a graph prefixed with its varint-encoded length.
pub fn write_delimited_to<W: Write, T: 'static, S: Schema<T>>(
    writer: &mut W,
    message: &Rc<RefCell<T>>,
    schema: &S,
    buffer: &mut BufferedOutput,
) -> Result<usize> {
    check_fresh(buffer)?;
    write_graph(buffer, message, schema)?;
    let size = buffer.size();
    if size > i32::MAX as usize {
        return Err(GraphbufError::MessageTooLarge(size));
    }
    let mut prefix = [0u8; MAX_VARINT_SIZE];
    let end = wire::put_varint32(&mut prefix, 0, size as u32);
    writer.write_all(&prefix[..end])?;
    buffer.stream_to(writer)?;
    Ok(size)
}

/// Merges an encoded graph into the instance behind `message`.
pub fn merge_from<T: 'static, S: Schema<T>>(
    data: &[u8],
    message: &Rc<RefCell<T>>,
    schema: &S,
) -> Result<()> {
    merge_from_bytes(Bytes::copy_from_slice(data), message, schema)
}

/// Merges an encoded graph from a [`Bytes`] buffer without copying it.
pub fn merge_from_bytes<T: 'static, S: Schema<T>>(
    data: Bytes,
    message: &Rc<RefCell<T>>,
    schema: &S,
) -> Result<()> {
    let mut input = GraphInput::new(BytesInput::new(data));
    merge_graph(&mut input, message, schema)
}

/// Merges an encoded graph from `reader` until EOF.
pub fn merge_from_reader<R: Read, T: 'static, S: Schema<T>>(
    reader: R,
    message: &Rc<RefCell<T>>,
    schema: &S,
) -> Result<()> {
    let mut input = GraphInput::new(StreamInput::new(reader));
    merge_graph(&mut input, message, schema)
}

/// Merges a length-prefixed graph from `reader`.
///
/// Exactly `varint(length) + length` bytes are consumed, so several
/// delimited graphs can stack on one stream.
pub fn merge_delimited_from<R: Read, T: 'static, S: Schema<T>>(
    mut reader: R,
    message: &Rc<RefCell<T>>,
    schema: &S,
) -> Result<()> {
    let data = crate::io::read_delimited_frame(&mut reader)?;
    let mut input = GraphInput::new(BytesInput::new(data));
    merge_graph(&mut input, message, schema)
}

fn write_graph<T: 'static, S: Schema<T>>(
    buffer: &mut BufferedOutput,
    message: &Rc<RefCell<T>>,
    schema: &S,
) -> Result<()> {
    let mut output = GraphOutput::new(buffer);
    output.register_root(message);
    let inner = message.borrow();
    schema.write_to(&mut output, &*inner)
}

fn merge_graph<I: Input, T: 'static, S: Schema<T>>(
    input: &mut GraphInput<I>,
    message: &Rc<RefCell<T>>,
    schema: &S,
) -> Result<()> {
    input.register_root(message);
    {
        let mut inner = message.borrow_mut();
        schema.merge_from(input, &mut *inner)?;
    }
    input.check_last_tag_was(0)?;
    check_initialized(&*message.borrow(), schema)
}

fn check_fresh(buffer: &BufferedOutput) -> Result<()> {
    if buffer.is_empty() {
        Ok(())
    } else {
        Err(GraphbufError::BufferState(
            "buffer previously used and had not been reset".into(),
        ))
    }
}
