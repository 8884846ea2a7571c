//! Centralized error handling for graphbuf.
//!
//! Every failure in the crate is represented as a [`GraphbufError`] value and
//! propagated through the [`Result`] alias; the library never panics on
//! malformed input (enforced by `#![deny(clippy::panic)]` and
//! `#![deny(clippy::unwrap_used)]`).
//!
//! ## Error Categories
//!
//! - **Decode errors** ([`GraphbufError::MalformedVarint`],
//!   [`GraphbufError::Truncated`], [`GraphbufError::SizeLimitExceeded`],
//!   [`GraphbufError::UnknownWireType`], [`GraphbufError::InvalidTag`],
//!   [`GraphbufError::InvalidUtf8`]): the input bytes violate the wire
//!   format or a configured bound. None of these are ever swallowed; unknown
//!   *field numbers* are not errors and are skipped instead.
//! - **Contract errors** ([`GraphbufError::BufferState`],
//!   [`GraphbufError::Uninitialized`]): a buffer was reused without a reset,
//!   finalized mid-write, or a merge left required fields unset.
//! - **Encode errors** ([`GraphbufError::MessageTooLarge`]): a nested
//!   message body exceeded the representable length; fatal, the write
//!   aborts immediately.
//! - **Graph errors** ([`GraphbufError::Graph`]): a reference marker could
//!   not be resolved against the per-call reference table.
//! - **I/O errors** ([`GraphbufError::Io`]): failures of the underlying
//!   stream or file, wrapped in `Arc` so the error stays `Clone`.

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for graphbuf operations.
pub type Result<T> = std::result::Result<T, GraphbufError>;

/// The master error enum covering all failure domains in graphbuf.
#[derive(Debug, Clone)]
pub enum GraphbufError {
    /// Low-level I/O failure from a stream-backed source or sink.
    ///
    /// The underlying `io::Error` is wrapped in an `Arc` to keep the error
    /// `Clone`, allowing it to be stored or shared across threads.
    Io(Arc<io::Error>),

    /// A varint's continuation bits never terminated within the maximum
    /// group count (10 bytes).
    MalformedVarint,

    /// The input ended before an expected byte count was satisfied, either
    /// at EOF or at the bound of an enclosing length-delimited region.
    Truncated,

    /// A declared length exceeded the configured ceiling.
    ///
    /// Raised *before* any allocation proportional to the declared length,
    /// so a corrupt or hostile length prefix cannot exhaust memory.
    SizeLimitExceeded {
        /// The length the input declared.
        declared: usize,
        /// The configured maximum.
        limit: usize,
    },

    /// A tag carried a wire type outside the supported set {0, 1, 2, 5}.
    UnknownWireType(u8),

    /// A tag was structurally invalid (field number zero), or the final tag
    /// of a message did not match the expected end sentinel.
    InvalidTag(u32),

    /// A string field did not contain valid UTF-8.
    InvalidUtf8,

    /// Required fields were absent after a merge.
    ///
    /// Carries the message name reported by the schema.
    Uninitialized(&'static str),

    /// A write buffer was reused without a reset, or reset/finalize was
    /// invoked while a nested write was still open.
    BufferState(String),

    /// A nested message body was too large for its length prefix.
    MessageTooLarge(usize),

    /// The reference table could not resolve a graph marker: unknown id,
    /// type mismatch, or a reference marker outside graph mode.
    Graph(String),
}

impl fmt::Display for GraphbufError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::MalformedVarint => {
                write!(f, "encountered a malformed varint")
            }
            Self::Truncated => {
                write!(f, "the input ended unexpectedly in the middle of a field")
            }
            Self::SizeLimitExceeded { declared, limit } => {
                write!(f, "size limit exceeded: {declared} > {limit}")
            }
            Self::UnknownWireType(wt) => {
                write!(f, "tag had an unknown wire type: {wt}")
            }
            Self::InvalidTag(tag) => {
                write!(f, "the input contained an invalid tag: {tag}")
            }
            Self::InvalidUtf8 => {
                write!(f, "string field contained invalid UTF-8")
            }
            Self::Uninitialized(name) => {
                write!(f, "message {name} is missing required fields")
            }
            Self::BufferState(s) => write!(f, "buffer state error: {s}"),
            Self::MessageTooLarge(size) => {
                write!(f, "message size {size} exceeds the length-prefix range")
            }
            Self::Graph(s) => write!(f, "corrupted object graph: {s}"),
        }
    }
}

impl std::error::Error for GraphbufError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for GraphbufError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
