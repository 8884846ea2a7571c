//! The buffered write engine: a growable, segmented buffer chain.
//!
//! [`BufferedOutput`] accumulates encoded fields in a chain of segments
//! held in an arena and addressed by index, so inserting a segment between
//! two existing ones is an index reassignment rather than pointer surgery.
//! The chain enables two things a flat buffer cannot do cheaply:
//!
//! - **Deferred length prefixes.** A nested message's length is unknowable
//!   before its body is encoded. [`BufferedOutput::write_message`]
//!   snapshots the chain, encodes the body, then splices a segment holding
//!   the exact minimal `tag ++ varint(length)` bytes in front of it. No
//!   double-pass sizing, no in-place byte shifting.
//! - **Zero-copy payloads.** A large [`Bytes`] payload is spliced into the
//!   chain as a read-only view instead of being copied.
//!
//! Finalization ([`BufferedOutput::to_vec`] /
//! [`BufferedOutput::stream_to`]) concatenates the chain root to tail,
//! skipping empty segments, and verifies the byte sum against the running
//! total.

use std::io::Write;

use bytes::Bytes;

use crate::constants::{ARRAY_COPY_SIZE_LIMIT, DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::error::{GraphbufError, Result};
use crate::output::Output;
use crate::schema::Schema;
use crate::wire::{self, WireType};

/// Index of a segment within the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentId(u32);

impl SegmentId {
    const ROOT: SegmentId = SegmentId(0);

    fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Backing storage of one segment.
#[derive(Debug)]
enum SegmentBuf {
    /// Writable storage owned by the chain.
    Owned(Box<[u8]>),
    /// Read-only view over caller-supplied bytes; never appended to.
    Shared(Bytes),
}

/// One link of the buffer chain.
///
/// Invariant: `start <= offset <= capacity`; only the tail segment of the
/// chain is actively written.
#[derive(Debug)]
struct Segment {
    buf: SegmentBuf,
    start: usize,
    offset: usize,
    next: Option<SegmentId>,
}

impl Segment {
    fn owned(capacity: usize) -> Self {
        Segment {
            buf: SegmentBuf::Owned(vec![0u8; capacity].into_boxed_slice()),
            start: 0,
            offset: 0,
            next: None,
        }
    }

    fn shared(bytes: Bytes) -> Self {
        let len = bytes.len();
        Segment {
            buf: SegmentBuf::Shared(bytes),
            start: 0,
            offset: len,
            next: None,
        }
    }

    /// A zero-capacity marker; the next write through it allocates.
    fn placeholder() -> Self {
        Segment {
            buf: SegmentBuf::Owned(Vec::new().into_boxed_slice()),
            start: 0,
            offset: 0,
            next: None,
        }
    }

    fn fits(&self, needed: usize) -> bool {
        match &self.buf {
            SegmentBuf::Owned(buf) => self.offset + needed <= buf.len(),
            SegmentBuf::Shared(_) => false,
        }
    }

    fn written(&self) -> &[u8] {
        match &self.buf {
            SegmentBuf::Owned(buf) => &buf[self.start..self.offset],
            SegmentBuf::Shared(bytes) => &bytes[self.start..self.offset],
        }
    }
}

/// Snapshot taken before recursing into a nested message's fields.
///
/// Stack-local only: created by [`BufferedOutput::begin_message`], consumed
/// by [`BufferedOutput::end_message`], never persisted.
#[must_use]
#[derive(Debug)]
pub(crate) struct NestedFrame {
    /// Tail segment at snapshot time; the length prefix splices after it.
    before: SegmentId,
    /// Placeholder opened for the body; the length prefix splices before it.
    body: SegmentId,
    /// Running total at snapshot time.
    size_before: usize,
}

/// Growable segmented write buffer with deferred length-prefix splicing.
///
/// Reusable across many serialize calls: [`BufferedOutput::reset`] drops
/// every segment after the root and rewinds the root in place, so a
/// long-lived buffer settles into a steady allocation footprint.
///
/// One instance must not be shared across threads without external
/// synchronization; independent instances are fully parallel.
#[derive(Debug)]
pub struct BufferedOutput {
    segments: Vec<Segment>,
    tail: SegmentId,
    size: usize,
    buffer_size: usize,
    open_frames: u32,
}

impl BufferedOutput {
    /// Creates a buffer with the default segment capacity.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Creates a buffer whose owned segments hold `buffer_size` bytes.
    ///
    /// Capacities below [`MIN_BUFFER_SIZE`] are clamped so a tag plus any
    /// scalar value always fits a fresh segment.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(MIN_BUFFER_SIZE);
        BufferedOutput {
            segments: vec![Segment::owned(buffer_size)],
            tail: SegmentId::ROOT,
            size: 0,
            buffer_size,
            open_frames: 0,
        }
    }

    /// Total bytes written so far.
    pub fn size(&self) -> usize {
        self.size
    }

    /// True if nothing has been written since creation or the last reset.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Resets the buffer for reuse, keeping the root segment's allocation.
    ///
    /// Fails with [`GraphbufError::BufferState`] while a nested write is in
    /// progress.
    pub fn reset(&mut self) -> Result<()> {
        if self.open_frames != 0 {
            return Err(GraphbufError::BufferState(
                "reset invoked while a nested write is open".into(),
            ));
        }
        self.segments.truncate(1);
        let root = &mut self.segments[SegmentId::ROOT.as_usize()];
        root.offset = root.start;
        root.next = None;
        self.tail = SegmentId::ROOT;
        self.size = 0;
        Ok(())
    }

    /// Concatenates the chain into a single byte vector.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size);
        self.for_each_segment(|bytes| {
            out.extend_from_slice(bytes);
            Ok(())
        })?;
        if out.len() != self.size {
            return Err(GraphbufError::BufferState(format!(
                "segment chain holds {} bytes but {} were tracked",
                out.len(),
                self.size
            )));
        }
        Ok(out)
    }

    /// Streams the chain into `writer`, returning the byte count.
    pub fn stream_to<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let mut written = 0usize;
        self.for_each_segment(|bytes| {
            writer.write_all(bytes)?;
            written += bytes.len();
            Ok(())
        })?;
        if written != self.size {
            return Err(GraphbufError::BufferState(format!(
                "segment chain holds {written} bytes but {} were tracked",
                self.size
            )));
        }
        Ok(written)
    }

    fn for_each_segment(&self, mut f: impl FnMut(&[u8]) -> Result<()>) -> Result<()> {
        if self.open_frames != 0 {
            return Err(GraphbufError::BufferState(
                "finalize invoked while a nested write is open".into(),
            ));
        }
        let mut node = Some(SegmentId::ROOT);
        while let Some(id) = node {
            let segment = &self.segments[id.as_usize()];
            let bytes = segment.written();
            if !bytes.is_empty() {
                f(bytes)?;
            }
            node = segment.next;
        }
        Ok(())
    }

    // --- chain mechanics -----------------------------------------------

    fn alloc(&mut self, segment: Segment) -> SegmentId {
        let id = SegmentId(u32::try_from(self.segments.len()).unwrap_or(u32::MAX));
        self.segments.push(segment);
        id
    }

    fn append_tail(&mut self, segment: Segment) -> SegmentId {
        let id = self.alloc(segment);
        self.segments[self.tail.as_usize()].next = Some(id);
        self.tail = id;
        id
    }

    /// Returns a tail segment with room for `needed` bytes, appending a
    /// fresh one when the current tail is full or read-only.
    fn writable_tail(&mut self, needed: usize) -> SegmentId {
        if self.segments[self.tail.as_usize()].fits(needed) {
            self.tail
        } else {
            self.append_tail(Segment::owned(self.buffer_size.max(needed)))
        }
    }

    fn write_to_tail(&mut self, id: SegmentId, write: impl FnOnce(&mut [u8], usize) -> usize) {
        let segment = &mut self.segments[id.as_usize()];
        debug_assert!(matches!(segment.buf, SegmentBuf::Owned(_)));
        if let SegmentBuf::Owned(buf) = &mut segment.buf {
            segment.offset = write(buf, segment.offset);
        }
    }

    fn write_tag_and_varint32(&mut self, tag: u32, value: u32) {
        let total = wire::varint32_size(tag) + wire::varint32_size(value);
        let id = self.writable_tail(total);
        self.write_to_tail(id, |buf, at| {
            let at = wire::put_varint32(buf, at, tag);
            wire::put_varint32(buf, at, value)
        });
        self.size += total;
    }

    fn write_tag_and_varint64(&mut self, tag: u32, value: u64) {
        let total = wire::varint32_size(tag) + wire::varint64_size(value);
        let id = self.writable_tail(total);
        self.write_to_tail(id, |buf, at| {
            let at = wire::put_varint32(buf, at, tag);
            wire::put_varint64(buf, at, value)
        });
        self.size += total;
    }

    fn write_tag_and_fixed32(&mut self, tag: u32, value: u32) {
        let total = wire::varint32_size(tag) + wire::FIXED_32_SIZE;
        let id = self.writable_tail(total);
        self.write_to_tail(id, |buf, at| {
            let at = wire::put_varint32(buf, at, tag);
            wire::put_fixed32(buf, at, value)
        });
        self.size += total;
    }

    fn write_tag_and_fixed64(&mut self, tag: u32, value: u64) {
        let total = wire::varint32_size(tag) + wire::FIXED_64_SIZE;
        let id = self.writable_tail(total);
        self.write_to_tail(id, |buf, at| {
            let at = wire::put_varint32(buf, at, tag);
            wire::put_fixed64(buf, at, value)
        });
        self.size += total;
    }

    /// Tag, length prefix, then a copy of the payload.
    fn write_tag_and_byte_slice(&mut self, tag: u32, value: &[u8]) -> Result<()> {
        let len = value.len();
        if len > i32::MAX as usize {
            return Err(GraphbufError::MessageTooLarge(len));
        }
        self.write_tag_and_varint32(tag, len as u32);
        if len == 0 {
            return Ok(());
        }
        let id = self.writable_tail(len);
        self.write_to_tail(id, |buf, at| {
            buf[at..at + len].copy_from_slice(value);
            at + len
        });
        self.size += len;
        Ok(())
    }

    /// Tag, length prefix, then the payload either copied in place (small
    /// and fitting) or spliced in as a read-only view.
    fn write_tag_and_shared_bytes(&mut self, tag: u32, value: &Bytes) -> Result<()> {
        let len = value.len();
        if len > i32::MAX as usize {
            return Err(GraphbufError::MessageTooLarge(len));
        }
        self.write_tag_and_varint32(tag, len as u32);
        if len == 0 {
            return Ok(());
        }
        self.size += len;
        let tail = self.tail;
        if len > ARRAY_COPY_SIZE_LIMIT || !self.segments[tail.as_usize()].fits(len) {
            self.append_tail(Segment::shared(value.clone()));
        } else {
            self.write_to_tail(tail, |buf, at| {
                buf[at..at + len].copy_from_slice(value);
                at + len
            });
        }
        Ok(())
    }

    // --- nested frames -------------------------------------------------

    /// Snapshots the chain and opens a placeholder tail for a nested body.
    pub(crate) fn begin_message(&mut self) -> NestedFrame {
        let before = self.tail;
        let size_before = self.size;
        let body = self.append_tail(Segment::placeholder());
        self.open_frames += 1;
        NestedFrame {
            before,
            body,
            size_before,
        }
    }

    /// Closes a nested frame: computes the body length and splices the
    /// exact `tag ++ varint(length)` segment between snapshot and body.
    ///
    /// The external tail is left unchanged.
    pub(crate) fn end_message(&mut self, frame: NestedFrame, field_number: u32) -> Result<()> {
        self.open_frames -= 1;
        let message_size = self.size - frame.size_before;
        if message_size > i32::MAX as usize {
            return Err(GraphbufError::MessageTooLarge(message_size));
        }
        let tag = wire::make_tag(field_number, WireType::LengthDelimited);
        let delimited = wire::tag_and_varint32_bytes(tag, message_size as u32);
        self.size += delimited.len();

        let offset = delimited.len();
        let prefix = self.alloc(Segment {
            buf: SegmentBuf::Owned(delimited),
            start: 0,
            offset,
            next: Some(frame.body),
        });
        self.segments[frame.before.as_usize()].next = Some(prefix);
        Ok(())
    }

    /// Drops an open frame after a failed body write so the buffer can
    /// still be reset.
    pub(crate) fn abandon_message(&mut self) {
        self.open_frames = self.open_frames.saturating_sub(1);
    }
}

impl Default for BufferedOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Output for BufferedOutput {
    fn write_int32(&mut self, field_number: u32, value: i32, _repeated: bool) -> Result<()> {
        let tag = wire::make_tag(field_number, WireType::Varint);
        if value < 0 {
            // sign-extended to 64 bits so cross-width readers agree
            self.write_tag_and_varint64(tag, value as i64 as u64);
        } else {
            self.write_tag_and_varint32(tag, value as u32);
        }
        Ok(())
    }

    fn write_uint32(&mut self, field_number: u32, value: u32, _repeated: bool) -> Result<()> {
        self.write_tag_and_varint32(wire::make_tag(field_number, WireType::Varint), value);
        Ok(())
    }

    fn write_sint32(&mut self, field_number: u32, value: i32, _repeated: bool) -> Result<()> {
        self.write_tag_and_varint32(
            wire::make_tag(field_number, WireType::Varint),
            wire::zigzag_encode32(value),
        );
        Ok(())
    }

    fn write_fixed32(&mut self, field_number: u32, value: u32, _repeated: bool) -> Result<()> {
        self.write_tag_and_fixed32(wire::make_tag(field_number, WireType::Fixed32), value);
        Ok(())
    }

    fn write_sfixed32(&mut self, field_number: u32, value: i32, _repeated: bool) -> Result<()> {
        self.write_tag_and_fixed32(wire::make_tag(field_number, WireType::Fixed32), value as u32);
        Ok(())
    }

    fn write_float(&mut self, field_number: u32, value: f32, _repeated: bool) -> Result<()> {
        self.write_tag_and_fixed32(wire::make_tag(field_number, WireType::Fixed32), value.to_bits());
        Ok(())
    }

    fn write_int64(&mut self, field_number: u32, value: i64, _repeated: bool) -> Result<()> {
        self.write_tag_and_varint64(wire::make_tag(field_number, WireType::Varint), value as u64);
        Ok(())
    }

    fn write_uint64(&mut self, field_number: u32, value: u64, _repeated: bool) -> Result<()> {
        self.write_tag_and_varint64(wire::make_tag(field_number, WireType::Varint), value);
        Ok(())
    }

    fn write_sint64(&mut self, field_number: u32, value: i64, _repeated: bool) -> Result<()> {
        self.write_tag_and_varint64(
            wire::make_tag(field_number, WireType::Varint),
            wire::zigzag_encode64(value),
        );
        Ok(())
    }

    fn write_fixed64(&mut self, field_number: u32, value: u64, _repeated: bool) -> Result<()> {
        self.write_tag_and_fixed64(wire::make_tag(field_number, WireType::Fixed64), value);
        Ok(())
    }

    fn write_sfixed64(&mut self, field_number: u32, value: i64, _repeated: bool) -> Result<()> {
        self.write_tag_and_fixed64(wire::make_tag(field_number, WireType::Fixed64), value as u64);
        Ok(())
    }

    fn write_double(&mut self, field_number: u32, value: f64, _repeated: bool) -> Result<()> {
        self.write_tag_and_fixed64(wire::make_tag(field_number, WireType::Fixed64), value.to_bits());
        Ok(())
    }

    fn write_bool(&mut self, field_number: u32, value: bool, _repeated: bool) -> Result<()> {
        self.write_tag_and_varint32(
            wire::make_tag(field_number, WireType::Varint),
            u32::from(value),
        );
        Ok(())
    }

    fn write_string(&mut self, field_number: u32, value: &str, _repeated: bool) -> Result<()> {
        self.write_tag_and_byte_slice(
            wire::make_tag(field_number, WireType::LengthDelimited),
            value.as_bytes(),
        )
    }

    fn write_bytes(&mut self, field_number: u32, value: &Bytes, _repeated: bool) -> Result<()> {
        self.write_tag_and_shared_bytes(
            wire::make_tag(field_number, WireType::LengthDelimited),
            value,
        )
    }

    fn write_byte_array(&mut self, field_number: u32, value: &[u8], _repeated: bool) -> Result<()> {
        self.write_tag_and_byte_slice(
            wire::make_tag(field_number, WireType::LengthDelimited),
            value,
        )
    }

    fn write_message<T, S: Schema<T>>(
        &mut self,
        field_number: u32,
        message: &T,
        schema: &S,
        _repeated: bool,
    ) -> Result<()> {
        let frame = self.begin_message();
        match schema.write_to(self, message) {
            Ok(()) => self.end_message(frame, field_number),
            Err(e) => {
                self.abandon_message();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn scalar_writes_fill_and_grow_segments() {
        let mut output = BufferedOutput::with_buffer_size(0); // clamped to MIN
        for i in 0..200u32 {
            output.write_uint64(1, u64::from(i) << 40, false).unwrap();
        }
        assert!(output.segments.len() > 1);
        let bytes = output.to_vec().unwrap();
        assert_eq!(bytes.len(), output.size());
    }

    #[test]
    fn large_bytes_payload_is_spliced_not_copied() {
        let payload = Bytes::from(vec![0xabu8; 10_000]);
        let mut output = BufferedOutput::new();
        output.write_bytes(1, &payload, false).unwrap();

        // the payload must appear as a shared view over the caller's buffer
        let shared = output
            .segments
            .iter()
            .find_map(|s| match &s.buf {
                SegmentBuf::Shared(b) => Some(b),
                SegmentBuf::Owned(_) => None,
            })
            .expect("payload was copied into an owned segment");
        assert_eq!(shared.as_ptr(), payload.as_ptr());

        // and the finalized output still carries it at the right offset
        let bytes = output.to_vec().unwrap();
        let prefix = 1 + wire::varint32_size(10_000);
        assert_eq!(bytes.len(), prefix + 10_000);
        assert_eq!(&bytes[prefix..], &payload[..]);
    }

    #[test]
    fn small_bytes_payload_is_copied_inline() {
        let payload = Bytes::from_static(b"inline");
        let mut output = BufferedOutput::new();
        output.write_bytes(1, &payload, false).unwrap();
        assert!(output
            .segments
            .iter()
            .all(|s| matches!(s.buf, SegmentBuf::Owned(_))));
        assert_eq!(output.to_vec().unwrap(), b"\x0a\x06inline");
    }

    #[test]
    fn reset_rewinds_without_growing() {
        let mut output = BufferedOutput::with_buffer_size(0);
        for i in 0..100u64 {
            output.write_uint64(2, i * 7, false).unwrap();
        }
        let first = output.to_vec().unwrap();
        output.reset().unwrap();
        assert_eq!(output.size(), 0);
        assert_eq!(output.segments.len(), 1);
        for i in 0..100u64 {
            output.write_uint64(2, i * 7, false).unwrap();
        }
        assert_eq!(output.to_vec().unwrap(), first);
    }

    #[test]
    fn nested_frame_splices_exact_length_prefix() {
        let mut output = BufferedOutput::new();
        let frame = output.begin_message();
        output.write_uint32(1, 150, false).unwrap();
        output.end_message(frame, 3).unwrap();
        // field 3, length 3, then field 1 = 150
        assert_eq!(output.to_vec().unwrap(), b"\x1a\x03\x08\x96\x01");
    }

    #[test]
    fn reset_mid_frame_is_rejected() {
        let mut output = BufferedOutput::new();
        let frame = output.begin_message();
        assert!(matches!(
            output.reset(),
            Err(GraphbufError::BufferState(_))
        ));
        assert!(matches!(
            output.to_vec(),
            Err(GraphbufError::BufferState(_))
        ));
        output.end_message(frame, 1).unwrap();
        assert!(output.reset().is_ok());
    }
}
