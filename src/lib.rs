//! # recpack
//!
//! A reflection-driven MessagePack codec for records, unions and containers.
//!
//! - Records are written as MessagePack maps keyed by field name
//! - Decoding is forward compatible: unknown keys are skipped, missing keys keep their default
//! - Sum types are written without a wrapper; the variant is inferred from the wire type on decode
//! - Primitives, strings (with optional truncation), `Option`, fixed arrays, `Vec`, sets, maps and
//!   fixed-capacity extension blobs are supported out of the box
//! - Custom derive macros for records and unions
//! - Feature-gated support for optional dependencies
//!
//! ## Attribute Macros
//!
//! Fields of a `#[derive(Record)]` struct accept the following attributes:
//!
//! - `#[record(rename = "Name")]`: Use the given string as the wire key instead of the field name.
//! - `#[record(max_len = N)]`: Write at most `N` bytes of a textual field. Truncation backs off to
//!   the nearest UTF-8 character boundary.
//! - `#[record(skip)]`: The field is neither written nor read. It keeps its default value on decode.
//!
//! `#[derive(Union)]` applies to enums whose variants each wrap exactly one value. The first
//! variant, in declaration order, that accepts the wire type of the incoming value is selected.
//!
//! ## Feature Flags
//!
//! - `chrono`: Enables `chrono::DateTime<Utc>` as the MessagePack timestamp extension (type -1).
//! - `uuid`: Enables `uuid::Uuid` as a 16-byte binary value.
//! - `indexmap`: Enables `IndexMap` and `IndexSet` collections.
//! - `ahash`: Enables `ahash::AHashMap` and `ahash::AHashSet`.
//! - `smol_str`: Enables `smol_str::SmolStr`.

pub mod core;
mod ext;
mod features;
mod record;
mod session;
pub mod wire;

extern crate self as recpack;

use bytes::Bytes;

pub use crate::core::truncate_str;
pub use crate::ext::Extension;
pub use crate::record::{decode_record_into, encode_record, Field, FieldCodec, Record, Serializable};
pub use crate::session::{
    from_msgpack, from_msgpack_with, read_session, read_shared_session, to_msgpack, write_session,
};
pub use crate::wire::{FloatValue, Reader, ReaderConfig, WireTag, Writer};
pub use recpack_derive::{Record, Union};

#[cfg(feature = "chrono")]
pub use crate::features::EXT_TIMESTAMP;

#[doc(hidden)]
pub use crate::core::unresolvable_union;

/// Errors that can occur during encoding or decoding operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The wire value has a different kind than the destination expects.
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: WireTag, found: WireTag },
    /// A fixed-size destination received a different number of elements or bytes.
    #[error("Size mismatch: expected {expected}, found {found}")]
    SizeMismatch { expected: usize, found: usize },
    /// No variant of a union accepts the incoming wire kind.
    #[error("No variant of {union_name} accepts wire type {found}")]
    UnresolvableUnion {
        union_name: &'static str,
        found: WireTag,
    },
    /// The byte stream is truncated, corrupt, or the writer was driven inconsistently.
    #[error(transparent)]
    MalformedStream(#[from] StreamError),
    /// A session was finalized while arrays or maps were still open.
    #[error("Session finalized with {open} open aggregate(s)")]
    SessionFinalize { open: usize },
    /// An integer does not fit the destination type.
    #[error("Integer {value} out of range for {target}")]
    OutOfRange { value: i128, target: &'static str },
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    /// More nested arrays/maps than [`ReaderConfig::max_depth`] allows.
    #[error("Nesting depth limit of {limit} exceeded")]
    DepthLimitExceeded { limit: usize },
    /// An extension value carries a different type code than the destination handles.
    #[error("Unexpected extension type {found}, expected {expected}")]
    UnexpectedExtension { expected: i8, found: i8 },
}

/// Byte-level stream errors raised by [`Writer`] and [`Reader`].
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Insufficient data in buffer: needed {needed} byte(s), {remaining} remaining")]
    InsufficientData { needed: usize, remaining: usize },
    #[error("Invalid marker byte 0x{0:02X}")]
    InvalidMarker(u8),
    #[error("Length {0} does not fit a 32-bit length prefix")]
    LengthOverflow(usize),
    #[error("Buffer full: capacity {capacity}, needed {needed}")]
    BufferFull { capacity: usize, needed: usize },
    #[error("More elements written than the {kind} declared")]
    AggregateOverflow { kind: WireTag },
    #[error("{kind} finished with {remaining} element(s) still expected")]
    UnbalancedAggregate { kind: WireTag, remaining: u64 },
    #[error("finish called for {expected} without a matching open {expected}")]
    MismatchedFinish { expected: WireTag },
    #[error("Failed to write MessagePack header: {0}")]
    Write(#[from] rmp::encode::ValueWriteError),
    #[error("Failed to read MessagePack header: {0}")]
    Read(#[from] rmp::decode::ValueReadError),
    #[error("Failed to read MessagePack integer: {0}")]
    ReadInteger(#[from] rmp::decode::NumValueReadError),
}

/// The result type used throughout this crate for encode/decode operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Trait for types that can be written as a MessagePack value.
///
/// Most users should use `#[derive(Record)]` or `#[derive(Union)]` instead of a manual
/// implementation.
pub trait Encoder {
    /// Static wire classification of this type.
    const WIRE_TAG: WireTag;

    /// Writes the value.
    ///
    /// # Arguments
    /// * `writer` - The writer to emit the value into.
    fn encode(&self, writer: &mut Writer) -> Result<()>;

    /// Writes the value, bounding textual content to `max_len` bytes.
    ///
    /// Non-textual types ignore the bound.
    fn encode_truncated(&self, writer: &mut Writer, max_len: usize) -> Result<()> {
        let _ = max_len;
        self.encode(writer)
    }
}

/// Trait for types that can be read from a MessagePack value.
pub trait Decoder: Sized {
    /// Reads a new value.
    ///
    /// # Arguments
    /// * `reader` - The reader positioned at the value.
    fn decode(reader: &mut Reader) -> Result<Self>;

    /// Reads a value into an existing destination, reusing its storage where the type
    /// allows it. On error the destination may be partially updated.
    fn decode_into(&mut self, reader: &mut Reader) -> Result<()> {
        *self = Self::decode(reader)?;
        Ok(())
    }

    /// Whether a wire value of kind `tag` can be decoded into this type. Unions use
    /// this to pick a variant.
    fn accepts(tag: WireTag) -> bool;
}

/// Convenience function to encode a value to bytes.
///
/// # Example
/// ```rust
/// use recpack::{from_bytes, to_bytes, Record};
///
/// #[derive(Record, Default, PartialEq, Debug)]
/// struct Reading {
///     id: u32,
///     name: String,
/// }
///
/// let value = Reading { id: 42, name: "hello".to_string() };
/// let bytes = to_bytes(&value).unwrap();
/// let decoded: Reading = from_bytes(bytes).unwrap();
/// assert_eq!(value, decoded);
/// ```
pub fn to_bytes<T: Encoder + ?Sized>(value: &T) -> Result<Bytes> {
    let mut writer = Writer::new();
    value.encode(&mut writer)?;
    writer.finish()
}

/// Convenience function to decode a value from bytes.
///
/// Trailing bytes after the value are ignored.
///
/// # Example
/// ```rust
/// use recpack::{from_bytes, to_bytes};
///
/// let bytes = to_bytes(&vec![1u8, 2, 3]).unwrap();
/// let decoded: Vec<u8> = from_bytes(bytes).unwrap();
/// assert_eq!(decoded, vec![1, 2, 3]);
/// ```
pub fn from_bytes<T: Decoder>(bytes: impl Into<Bytes>) -> Result<T> {
    let mut reader = Reader::new(bytes);
    let value = T::decode(&mut reader)?;
    reader.finish()?;
    Ok(value)
}
