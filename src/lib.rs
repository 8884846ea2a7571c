//! # graphbuf
//!
//! A binary object-serialization engine speaking the protobuf wire format,
//! with one added capability: object graphs containing shared references
//! and cycles serialize and come back intact.
//!
//! ## Overview
//!
//! Traditional protobuf codecs either compute every nested message's size
//! in a separate pass or shift bytes around to backpatch length prefixes.
//! graphbuf does neither: encoded bytes accumulate in a chain of buffer
//! segments, and when a nested message closes, a segment holding its exact
//! `tag ++ varint(length)` prefix is spliced in front of the already
//! encoded body. Large byte payloads are spliced the same way as read-only
//! views, never copied.
//!
//! ### Key Features
//!
//! *   **Single-pass nested encoding:** lengths are computed after the body
//!     is written, with minimal varint width and no byte shifting.
//! *   **Zero-copy payloads:** large [`bytes::Bytes`] fields are linked
//!     into the output chain and sliced out of in-memory inputs without
//!     copying.
//! *   **Graph mode:** [`graph`] tracks object identity per top-level call,
//!     so shared subobjects encode once and cycles terminate; an unshared
//!     graph costs zero extra wire bytes.
//! *   **Reusable buffers:** a [`BufferedOutput`] is reset and reused
//!     across calls without releasing its root allocation.
//! *   **Bounded decoding:** declared lengths are checked against a
//!     configurable ceiling before any allocation, and nested limits make
//!     a corrupt inner length unable to escape its enclosing frame.
//!
//! ## Architecture
//!
//! The engine never looks inside a message. Each message type carries a
//! [`Schema`](schema::Schema): `write_to` visits present fields in
//! ascending field-number order against an [`Output`]; `merge_from` loops
//! over tags from an [`Input`], dispatching by field number and skipping
//! unknown ones.
//! Schemas are usually generated with `#[derive(Schema)]`, or written by
//! hand for full control.
//!
//! [`BufferedOutput`] implements [`Output`] over an arena of chain
//! segments; [`BytesInput`] and [`StreamInput`] implement [`Input`] over
//! memory and streams. [`graph::GraphOutput`] / [`graph::GraphInput`] wrap
//! them with the reference table.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use graphbuf::{io, Schema};
//!
//! #[derive(Debug, Default, PartialEq, Schema)]
//! struct Point {
//!     #[graphbuf(field = 1)]
//!     x: i32,
//!     #[graphbuf(field = 2)]
//!     y: i32,
//! }
//!
//! let point = Point { x: 3, y: -4 };
//! let bytes = io::to_vec(&point, &PointSchema)?;
//!
//! let mut restored = Point::default();
//! io::merge_from(&bytes, &mut restored, &PointSchema)?;
//! assert_eq!(point, restored);
//! ```
//!
//! Cyclic structures go through [`graph`] with `Rc<RefCell<T>>` fields; see
//! the module docs for the marker format.
//!
//! ## Safety and Error Handling
//!
//! * **Encapsulated unsafe:** the only `unsafe` block is the memory map in
//!   [`io::merge_from_file`].
//! * **No panics:** no `unwrap()` or `panic!()` in the library (enforced by
//!   clippy lints); malformed input always surfaces a [`GraphbufError`].
//! * **Single-threaded instances:** an engine instance is mutated in place
//!   with no locking; independent instances run fully in parallel.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod buffer;
pub mod error;
pub mod graph;
pub mod input;
pub mod io;
pub mod output;
pub mod reader;
pub mod schema;
pub mod stream;
pub mod wire;

// --- RE-EXPORTS ---

pub use buffer::BufferedOutput;
pub use error::{GraphbufError, Result};
pub use input::Input;
pub use output::Output;
pub use reader::BytesInput;
pub use schema::Schema;
pub use stream::StreamInput;

// Re-export the derive macro so it is accessible as `graphbuf::Schema` in
// derive position, serde-style.
pub use graphbuf_derive::Schema;

/// Constants used throughout the library.
pub mod constants {
    /// Default capacity of an owned chain segment.
    pub const DEFAULT_BUFFER_SIZE: usize = 512;

    /// Smallest allowed segment capacity; a tag plus any scalar value must
    /// always fit a fresh segment.
    pub const MIN_BUFFER_SIZE: usize = 256;

    /// Payloads at or below this length are copied into the tail segment
    /// instead of spliced as a shared view.
    pub const ARRAY_COPY_SIZE_LIMIT: usize = 64;

    /// Default ceiling for lengths declared by the input (64 MiB).
    pub const DEFAULT_SIZE_LIMIT: usize = 64 << 20;

    /// Default read-ahead buffer capacity for stream decoding.
    pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 4096;
}
