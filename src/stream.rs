//! Stream decoding: a read-ahead buffered cursor over any [`Read`] source.
//!
//! [`StreamInput`] maintains an internal buffer that is refilled on demand.
//! Limits are tracked as absolute positions (`bytes retired + buffer
//! position`); when a limit falls inside the buffered window the visible
//! window is trimmed (`buffer_size_after_limit`) and restored when the
//! limit is popped, so nested regions can never observe bytes past their
//! declared bound. Unlike the in-memory cursor, length-delimited reads copy
//! into an owned array sized exactly to the declared length.

use std::io::Read;

use bytes::Bytes;

use crate::constants::{DEFAULT_SIZE_LIMIT, DEFAULT_STREAM_BUFFER_SIZE};
use crate::error::{GraphbufError, Result};
use crate::input::Input;
use crate::wire::{self, MAX_VARINT_SIZE};

/// "No limit" sentinel for [`StreamInput::current_limit`].
const NO_LIMIT: usize = usize::MAX;

/// Bounded, limit-aware cursor for decoding from a stream.
#[derive(Debug)]
pub struct StreamInput<R> {
    reader: R,
    buffer: Box<[u8]>,
    /// Valid bytes in `buffer`, excluding any trimmed post-limit window.
    buffer_size: usize,
    buffer_pos: usize,
    /// Bytes consumed and discarded from the buffer so far.
    total_bytes_retired: usize,
    /// Absolute position of the innermost limit, or [`NO_LIMIT`].
    current_limit: usize,
    /// Buffered bytes hidden because they lie past `current_limit`.
    buffer_size_after_limit: usize,
    last_tag: u32,
    size_limit: usize,
}

impl<R: Read> StreamInput<R> {
    /// Creates a cursor over `reader` with the default read-ahead buffer.
    pub fn new(reader: R) -> Self {
        StreamInput {
            reader,
            buffer: vec![0u8; DEFAULT_STREAM_BUFFER_SIZE].into_boxed_slice(),
            buffer_size: 0,
            buffer_pos: 0,
            total_bytes_retired: 0,
            current_limit: NO_LIMIT,
            buffer_size_after_limit: 0,
            last_tag: 0,
            size_limit: DEFAULT_SIZE_LIMIT,
        }
    }

    /// Replaces the default ceiling for declared lengths.
    pub fn with_size_limit(mut self, size_limit: usize) -> Self {
        self.size_limit = size_limit;
        self
    }

    /// Absolute position of the cursor in the stream.
    fn position(&self) -> usize {
        self.total_bytes_retired + self.buffer_pos
    }

    fn recompute_buffer_size_after_limit(&mut self) {
        self.buffer_size += self.buffer_size_after_limit;
        let buffer_end = self.total_bytes_retired + self.buffer_size;
        if buffer_end > self.current_limit {
            self.buffer_size_after_limit = buffer_end - self.current_limit;
            self.buffer_size -= self.buffer_size_after_limit;
        } else {
            self.buffer_size_after_limit = 0;
        }
    }

    /// Refills the buffer once the readable window is exhausted.
    ///
    /// Returns `false` at the current limit or EOF when `must_succeed` is
    /// off; fails with `Truncated` otherwise.
    fn refill_buffer(&mut self, must_succeed: bool) -> Result<bool> {
        debug_assert_eq!(self.buffer_pos, self.buffer_size);
        if self.total_bytes_retired + self.buffer_size == self.current_limit {
            // hit the innermost limit; no refill may cross it
            return if must_succeed {
                Err(GraphbufError::Truncated)
            } else {
                Ok(false)
            };
        }
        self.total_bytes_retired += self.buffer_size;
        self.buffer_pos = 0;
        self.buffer_size = self.reader.read(&mut self.buffer)?;
        if self.buffer_size == 0 {
            if must_succeed {
                Err(GraphbufError::Truncated)
            } else {
                Ok(false)
            }
        } else {
            self.recompute_buffer_size_after_limit();
            Ok(true)
        }
    }

    fn at_end(&mut self) -> Result<bool> {
        if self.buffer_pos < self.buffer_size {
            Ok(false)
        } else {
            Ok(!self.refill_buffer(false)?)
        }
    }

    fn read_raw_byte(&mut self) -> Result<u8> {
        if self.buffer_pos == self.buffer_size {
            self.refill_buffer(true)?;
        }
        let byte = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Ok(byte)
    }
}

impl<R: Read> Input for StreamInput<R> {
    fn read_tag(&mut self) -> Result<u32> {
        if self.at_end()? {
            self.last_tag = 0;
            return Ok(0);
        }
        let tag = self.read_varint32()?;
        if wire::tag_field_number(tag) == 0 {
            return Err(GraphbufError::InvalidTag(tag));
        }
        self.last_tag = tag;
        Ok(tag)
    }

    fn check_last_tag_was(&self, expected: u32) -> Result<()> {
        if self.last_tag == expected {
            Ok(())
        } else {
            Err(GraphbufError::InvalidTag(self.last_tag))
        }
    }

    fn read_varint32(&mut self) -> Result<u32> {
        Ok(self.read_varint64()? as u32)
    }

    fn read_varint64(&mut self) -> Result<u64> {
        let mut result = 0u64;
        for shift in 0..MAX_VARINT_SIZE {
            let byte = self.read_raw_byte()?;
            result |= u64::from(byte & 0x7f) << (shift * 7);
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(GraphbufError::MalformedVarint)
    }

    fn read_fixed32(&mut self) -> Result<u32> {
        let mut raw = [0u8; wire::FIXED_32_SIZE];
        for slot in &mut raw {
            *slot = self.read_raw_byte()?;
        }
        Ok(u32::from_le_bytes(raw))
    }

    fn read_fixed64(&mut self) -> Result<u64> {
        let mut raw = [0u8; wire::FIXED_64_SIZE];
        for slot in &mut raw {
            *slot = self.read_raw_byte()?;
        }
        Ok(u64::from_le_bytes(raw))
    }

    fn read_bytes(&mut self) -> Result<Bytes> {
        let len = self.read_varint32()? as usize;
        if len > self.size_limit {
            return Err(GraphbufError::SizeLimitExceeded {
                declared: len,
                limit: self.size_limit,
            });
        }
        if self.position() + len > self.current_limit {
            return Err(GraphbufError::Truncated);
        }
        let mut out = vec![0u8; len];
        let buffered = (self.buffer_size - self.buffer_pos).min(len);
        out[..buffered].copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + buffered]);
        self.buffer_pos += buffered;
        if buffered < len {
            // drain the rest straight from the reader, bypassing the buffer
            self.total_bytes_retired += self.buffer_size;
            self.buffer_pos = 0;
            self.buffer_size = 0;
            self.reader
                .read_exact(&mut out[buffered..])
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::UnexpectedEof => GraphbufError::Truncated,
                    _ => GraphbufError::from(e),
                })?;
            self.total_bytes_retired += len - buffered;
        }
        Ok(Bytes::from(out))
    }

    fn skip_raw_bytes(&mut self, count: usize) -> Result<()> {
        if self.position() + count > self.current_limit {
            return Err(GraphbufError::Truncated);
        }
        let buffered = self.buffer_size - self.buffer_pos;
        if count <= buffered {
            self.buffer_pos += count;
            return Ok(());
        }
        let mut remaining = count - buffered;
        self.total_bytes_retired += self.buffer_size;
        self.buffer_pos = 0;
        self.buffer_size = 0;
        while remaining > 0 {
            let n = self.reader.read(&mut self.buffer)?;
            if n == 0 {
                return Err(GraphbufError::Truncated);
            }
            if n > remaining {
                self.buffer_size = n;
                self.buffer_pos = remaining;
                self.recompute_buffer_size_after_limit();
                remaining = 0;
            } else {
                self.total_bytes_retired += n;
                remaining -= n;
            }
        }
        Ok(())
    }

    fn push_limit(&mut self, byte_count: usize) -> Result<usize> {
        let absolute = self.position() + byte_count;
        if absolute > self.current_limit {
            return Err(GraphbufError::Truncated);
        }
        let old_limit = self.current_limit;
        self.current_limit = absolute;
        self.recompute_buffer_size_after_limit();
        Ok(old_limit)
    }

    fn pop_limit(&mut self, old_limit: usize) {
        self.current_limit = old_limit;
        self.recompute_buffer_size_after_limit();
    }

    fn size_limit(&self) -> usize {
        self.size_limit
    }
}
