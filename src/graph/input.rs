//! Reference-tracking read wrapper.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;

use crate::error::{GraphbufError, Result};
use crate::input::Input;
use crate::schema::Schema;
use crate::wire::{self, WireType};

/// Read-side graph wrapper over any [`Input`].
///
/// Mirrors [`super::GraphOutput`]: instances are registered in the same
/// first-encounter order the encoder assigned ids in, so id `n` on the wire
/// always resolves to the `n`-th constructed instance. A fresh instance is
/// registered *before* its fields are merged; a back-reference met while
/// that instance is still being populated therefore resolves to the
/// (not-yet-complete) instance itself, which is what makes cycles work.
///
/// The table lives for exactly one top-level merge.
pub struct GraphInput<I> {
    input: I,
    references: Vec<Rc<dyn Any>>,
}

impl<I: std::fmt::Debug> std::fmt::Debug for GraphInput<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphInput")
            .field("input", &self.input)
            .field("references", &self.references.len())
            .finish()
    }
}

impl<I: Input> GraphInput<I> {
    /// Wraps `input` with a fresh reference table.
    pub fn new(input: I) -> Self {
        GraphInput {
            input,
            references: Vec::new(),
        }
    }

    /// Registers the top-level instance as reference id 1.
    pub(crate) fn register_root<T: 'static>(&mut self, root: &Rc<RefCell<T>>) {
        self.register(root.clone());
    }

    fn register<T: 'static>(&mut self, instance: Rc<RefCell<T>>) -> u32 {
        self.references.push(instance);
        self.references.len() as u32
    }

    fn resolve<T: 'static>(&self, id: u32) -> Result<Rc<RefCell<T>>> {
        let slot = (id as usize)
            .checked_sub(1)
            .and_then(|at| self.references.get(at))
            .ok_or_else(|| GraphbufError::Graph(format!("unresolved reference id {id}")))?;
        slot.clone()
            .downcast::<RefCell<T>>()
            .map_err(|_| GraphbufError::Graph(format!("reference id {id} has a different type")))
    }
}

impl<I: Input> Input for GraphInput<I> {
    fn read_tag(&mut self) -> Result<u32> {
        self.input.read_tag()
    }

    fn check_last_tag_was(&self, expected: u32) -> Result<()> {
        self.input.check_last_tag_was(expected)
    }

    fn read_varint32(&mut self) -> Result<u32> {
        self.input.read_varint32()
    }

    fn read_varint64(&mut self) -> Result<u64> {
        self.input.read_varint64()
    }

    fn read_fixed32(&mut self) -> Result<u32> {
        self.input.read_fixed32()
    }

    fn read_fixed64(&mut self) -> Result<u64> {
        self.input.read_fixed64()
    }

    fn read_bytes(&mut self) -> Result<Bytes> {
        self.input.read_bytes()
    }

    fn skip_raw_bytes(&mut self, count: usize) -> Result<()> {
        self.input.skip_raw_bytes(count)
    }

    fn push_limit(&mut self, byte_count: usize) -> Result<usize> {
        self.input.push_limit(byte_count)
    }

    fn pop_limit(&mut self, old_limit: usize) {
        self.input.pop_limit(old_limit)
    }

    fn size_limit(&self) -> usize {
        self.input.size_limit()
    }

    fn merge_graph_message<T: 'static, S: Schema<T>>(
        &mut self,
        tag: u32,
        schema: &S,
    ) -> Result<Rc<RefCell<T>>> {
        match WireType::of_tag(tag)? {
            // back-reference: bind the existing instance, no field parsing
            WireType::Varint => {
                let id = self.read_varint32()?;
                self.resolve(id)
            }
            WireType::LengthDelimited => {
                let message = Rc::new(RefCell::new(schema.new_message()));
                self.register(message.clone());
                {
                    let mut inner = message.borrow_mut();
                    self.merge_message(&mut *inner, schema)?;
                }
                Ok(message)
            }
            other => Err(GraphbufError::Graph(format!(
                "wire type {:?} cannot carry a graph field (field {})",
                other,
                wire::tag_field_number(tag)
            ))),
        }
    }
}
