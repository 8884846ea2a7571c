//! Reference-tracking write wrapper.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::rc::Rc;

use bytes::Bytes;
use twox_hash::XxHash64;

use crate::buffer::BufferedOutput;
use crate::error::Result;
use crate::output::Output;
use crate::schema::Schema;

/// Identity table keyed by `Rc` allocation address.
///
/// Keyed by object identity, never structural equality: two equal but
/// distinct instances get two ids, one instance reached twice gets one.
type IdentityMap = HashMap<*const (), u32, BuildHasherDefault<XxHash64>>;

/// Write-side graph wrapper over a [`BufferedOutput`].
///
/// Turns the plain tree encoder into a graph encoder: the first encounter
/// of an instance assigns it the next dense reference id and encodes it as
/// an ordinary nested message; every later encounter emits a compact
/// back-reference (the same field number, varint wire type, carrying the
/// id) without invoking the schema at all, which is what terminates
/// recursion on cycles.
///
/// The table lives for exactly one top-level write and is discarded with
/// the wrapper.
#[derive(Debug)]
pub struct GraphOutput<'o> {
    output: &'o mut BufferedOutput,
    references: IdentityMap,
    next_id: u32,
}

impl<'o> GraphOutput<'o> {
    /// Wraps `output` with a fresh reference table.
    pub fn new(output: &'o mut BufferedOutput) -> Self {
        GraphOutput {
            output,
            references: IdentityMap::default(),
            next_id: 1,
        }
    }

    /// Registers the top-level instance before its fields are written, so
    /// cycles that point back at the root resolve to it.
    pub(crate) fn register_root<T>(&mut self, root: &Rc<RefCell<T>>) {
        self.track(Rc::as_ptr(root) as *const ());
    }

    fn track(&mut self, key: *const ()) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.references.insert(key, id);
        id
    }
}

impl Output for GraphOutput<'_> {
    fn write_int32(&mut self, field_number: u32, value: i32, repeated: bool) -> Result<()> {
        self.output.write_int32(field_number, value, repeated)
    }

    fn write_uint32(&mut self, field_number: u32, value: u32, repeated: bool) -> Result<()> {
        self.output.write_uint32(field_number, value, repeated)
    }

    fn write_sint32(&mut self, field_number: u32, value: i32, repeated: bool) -> Result<()> {
        self.output.write_sint32(field_number, value, repeated)
    }

    fn write_fixed32(&mut self, field_number: u32, value: u32, repeated: bool) -> Result<()> {
        self.output.write_fixed32(field_number, value, repeated)
    }

    fn write_sfixed32(&mut self, field_number: u32, value: i32, repeated: bool) -> Result<()> {
        self.output.write_sfixed32(field_number, value, repeated)
    }

    fn write_float(&mut self, field_number: u32, value: f32, repeated: bool) -> Result<()> {
        self.output.write_float(field_number, value, repeated)
    }

    fn write_int64(&mut self, field_number: u32, value: i64, repeated: bool) -> Result<()> {
        self.output.write_int64(field_number, value, repeated)
    }

    fn write_uint64(&mut self, field_number: u32, value: u64, repeated: bool) -> Result<()> {
        self.output.write_uint64(field_number, value, repeated)
    }

    fn write_sint64(&mut self, field_number: u32, value: i64, repeated: bool) -> Result<()> {
        self.output.write_sint64(field_number, value, repeated)
    }

    fn write_fixed64(&mut self, field_number: u32, value: u64, repeated: bool) -> Result<()> {
        self.output.write_fixed64(field_number, value, repeated)
    }

    fn write_sfixed64(&mut self, field_number: u32, value: i64, repeated: bool) -> Result<()> {
        self.output.write_sfixed64(field_number, value, repeated)
    }

    fn write_double(&mut self, field_number: u32, value: f64, repeated: bool) -> Result<()> {
        self.output.write_double(field_number, value, repeated)
    }

    fn write_bool(&mut self, field_number: u32, value: bool, repeated: bool) -> Result<()> {
        self.output.write_bool(field_number, value, repeated)
    }

    fn write_string(&mut self, field_number: u32, value: &str, repeated: bool) -> Result<()> {
        self.output.write_string(field_number, value, repeated)
    }

    fn write_bytes(&mut self, field_number: u32, value: &Bytes, repeated: bool) -> Result<()> {
        self.output.write_bytes(field_number, value, repeated)
    }

    fn write_byte_array(&mut self, field_number: u32, value: &[u8], repeated: bool) -> Result<()> {
        self.output.write_byte_array(field_number, value, repeated)
    }

    /// Plain nested messages are framed here (not delegated wholesale) so
    /// the schema keeps writing through the graph wrapper and graph fields
    /// at any depth stay tracked.
    fn write_message<T, S: Schema<T>>(
        &mut self,
        field_number: u32,
        message: &T,
        schema: &S,
        _repeated: bool,
    ) -> Result<()> {
        let frame = self.output.begin_message();
        match schema.write_to(self, message) {
            Ok(()) => self.output.end_message(frame, field_number),
            Err(e) => {
                self.output.abandon_message();
                Err(e)
            }
        }
    }

    fn write_graph_message<T: 'static, S: Schema<T>>(
        &mut self,
        field_number: u32,
        message: &Rc<RefCell<T>>,
        schema: &S,
        repeated: bool,
    ) -> Result<()> {
        let key = Rc::as_ptr(message) as *const ();
        if let Some(&id) = self.references.get(&key) {
            // already encoded: a bare varint back-reference, no recursion
            return self.output.write_uint32(field_number, id, repeated);
        }
        self.track(key);
        let frame = self.output.begin_message();
        let inner = message.borrow();
        let written = schema.write_to(self, &*inner);
        drop(inner);
        match written {
            Ok(()) => self.output.end_message(frame, field_number),
            Err(e) => {
                self.output.abandon_message();
                Err(e)
            }
        }
    }
}
