//! Tree-mode entry points: serialize and merge plain message trees.
//!
//! These functions drive a [`Schema`] against the buffered engine. Messages
//! with shared references or cycles must go through [`crate::graph`]
//! instead; everything here assumes each instance is visited exactly once.
//!
//! Callers that serialize in a loop should hold on to one
//! [`BufferedOutput`] and pass it to the `*_with` variants: the buffer is
//! rewound by [`BufferedOutput::reset`] without releasing its root
//! allocation. A buffer that was not reset is rejected, never silently
//! overwritten.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bytes::Bytes;
use memmap2::Mmap;

use crate::buffer::BufferedOutput;
use crate::constants::DEFAULT_SIZE_LIMIT;
use crate::error::{GraphbufError, Result};
use crate::input::Input;
use crate::reader::BytesInput;
use crate::schema::Schema;
use crate::stream::StreamInput;
use crate::wire::{self, MAX_VARINT_SIZE};

/// Serializes `message` into a fresh byte vector.
pub fn to_vec<T, S: Schema<T>>(message: &T, schema: &S) -> Result<Vec<u8>> {
    let mut buffer = BufferedOutput::new();
    schema.write_to(&mut buffer, message)?;
    buffer.to_vec()
}

/// Serializes `message` through a caller-supplied reusable buffer.
pub fn to_vec_with<T, S: Schema<T>>(
    buffer: &mut BufferedOutput,
    message: &T,
    schema: &S,
) -> Result<Vec<u8>> {
    check_fresh(buffer)?;
    schema.write_to(buffer, message)?;
    buffer.to_vec()
}

/// Writes `message` into `buffer` without finalizing, returning its size.
///
/// The caller finalizes with [`BufferedOutput::to_vec`] or
/// [`BufferedOutput::stream_to`], possibly after framing of its own.
pub fn write_to<T, S: Schema<T>>(
    buffer: &mut BufferedOutput,
    message: &T,
    schema: &S,
) -> Result<usize> {
    check_fresh(buffer)?;
    schema.write_to(buffer, message)?;
    Ok(buffer.size())
}

/// Serializes `message` into `writer`, returning the byte count.
pub fn stream_to<W: Write, T, S: Schema<T>>(
    writer: &mut W,
    message: &T,
    schema: &S,
    buffer: &mut BufferedOutput,
) -> Result<usize> {
    check_fresh(buffer)?;
    schema.write_to(buffer, message)?;
    buffer.stream_to(writer)
}

/// Serializes `message` prefixed with its varint-encoded length.
pub fn write_delimited_to<W: Write, T, S: Schema<T>>(
    writer: &mut W,
    message: &T,
    schema: &S,
    buffer: &mut BufferedOutput,
) -> Result<usize> {
    check_fresh(buffer)?;
    schema.write_to(buffer, message)?;
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

/// Merges the encoded `data` into `message`.
///
/// The slice is copied once; use [`merge_from_bytes`] to decode without
/// copying the input.
pub fn merge_from<T, S: Schema<T>>(data: &[u8], message: &mut T, schema: &S) -> Result<()> {
    merge_from_bytes(Bytes::copy_from_slice(data), message, schema)
}

/// Merges an encoded [`Bytes`] buffer into `message`.
///
/// Length-delimited fields decode as zero-copy views of `data`.
pub fn merge_from_bytes<T, S: Schema<T>>(data: Bytes, message: &mut T, schema: &S) -> Result<()> {
    let mut input = BytesInput::new(data);
    schema.merge_from(&mut input, message)?;
    input.check_last_tag_was(0)?;
    check_initialized(message, schema)
}

/// Merges an encoded message from `reader` until EOF.
pub fn merge_from_reader<R: Read, T, S: Schema<T>>(
    reader: R,
    message: &mut T,
    schema: &S,
) -> Result<()> {
    let mut input = StreamInput::new(reader);
    schema.merge_from(&mut input, message)?;
    input.check_last_tag_was(0)?;
    check_initialized(message, schema)
}

/// Merges a length-prefixed message from `reader`.
///
/// Exactly `varint(length) + length` bytes are consumed, so several
/// delimited messages can stack on one stream. The declared length is
/// validated against the size limit before any allocation proportional to
/// it.
pub fn merge_delimited_from<R: Read, T, S: Schema<T>>(
    mut reader: R,
    message: &mut T,
    schema: &S,
) -> Result<()> {
    let data = read_delimited_frame(&mut reader)?;
    let mut input = BytesInput::new(data);
    schema.merge_from(&mut input, message)?;
    input.check_last_tag_was(0)?;
    check_initialized(message, schema)
}

/// Reads one `varint(length) ++ body` frame, consuming nothing past it.
///
/// The length varint is read byte by byte straight off the reader (no
/// read-ahead), and the body buffer is allocated only after the declared
/// length passes the size-limit guard.
pub(crate) fn read_delimited_frame<R: Read>(reader: &mut R) -> Result<Bytes> {
    let mut len = 0u64;
    let mut byte = [0u8; 1];
    for shift in 0..MAX_VARINT_SIZE {
        reader.read_exact(&mut byte).map_err(truncated_eof)?;
        len |= u64::from(byte[0] & 0x7f) << (shift * 7);
        if byte[0] & 0x80 == 0 {
            let len = len as usize;
            if len > DEFAULT_SIZE_LIMIT {
                return Err(GraphbufError::SizeLimitExceeded {
                    declared: len,
                    limit: DEFAULT_SIZE_LIMIT,
                });
            }
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body).map_err(truncated_eof)?;
            return Ok(Bytes::from(body));
        }
    }
    Err(GraphbufError::MalformedVarint)
}

fn truncated_eof(e: std::io::Error) -> GraphbufError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => GraphbufError::Truncated,
        _ => GraphbufError::from(e),
    }
}

/// Merges an encoded message from a file, decoding from a memory map.
///
/// The mapping is shared into the decode path without copying, so large
/// payload fields become views over the mapped region.
pub fn merge_from_file<P: AsRef<Path>, T, S: Schema<T>>(
    path: P,
    message: &mut T,
    schema: &S,
) -> Result<()> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let data = if len == 0 {
        Bytes::new()
    } else {
        // Safety: the mapping is read-only and assumed not to be mutated by
        // external processes while decoding (standard practice).
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Bytes::from_owner(mmap)
    };
    merge_from_bytes(data, message, schema)
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

pub(crate) fn check_initialized<T, S: Schema<T>>(message: &T, schema: &S) -> Result<()> {
    if schema.is_initialized(message) {
        Ok(())
    } else {
        Err(GraphbufError::Uninitialized(schema.message_name()))
    }
}
