//! Field descriptors and the record codec.
//!
//! A record is described by a static list of [`Field`] descriptors, one per member,
//! each pairing the wire key with accessors for the member. The list is normally
//! generated by `#[derive(Record)]`.

use crate::*;
use std::fmt;

/// Type-erased view of one field descriptor of record `R`.
pub trait FieldCodec<R> {
    /// Wire key of the field.
    fn name(&self) -> &'static str;

    /// Maximum number of bytes written for textual members.
    fn max_len(&self) -> Option<usize>;

    /// Static wire classification of the member type.
    fn wire_tag(&self) -> WireTag;

    fn encode_field(&self, record: &R, writer: &mut Writer) -> Result<()>;

    /// Decodes the next wire value into the member, reusing its current storage.
    fn decode_field(&self, record: &mut R, reader: &mut Reader) -> Result<()>;
}

/// Describes member `M` of record `R`.
pub struct Field<R, M> {
    name: &'static str,
    get: fn(&R) -> &M,
    get_mut: fn(&mut R) -> &mut M,
    max_len: Option<usize>,
}

impl<R, M> Field<R, M> {
    pub const fn new(name: &'static str, get: fn(&R) -> &M, get_mut: fn(&mut R) -> &mut M) -> Self {
        Self {
            name,
            get,
            get_mut,
            max_len: None,
        }
    }

    /// Bounds the number of bytes written for a textual member.
    pub const fn with_max_len(self, max_len: usize) -> Self {
        Self {
            name: self.name,
            get: self.get,
            get_mut: self.get_mut,
            max_len: Some(max_len),
        }
    }
}

impl<R, M> fmt::Debug for Field<R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("max_len", &self.max_len)
            .finish()
    }
}

impl<R, M: Encoder + Decoder> FieldCodec<R> for Field<R, M> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    fn wire_tag(&self) -> WireTag {
        M::WIRE_TAG
    }

    fn encode_field(&self, record: &R, writer: &mut Writer) -> Result<()> {
        let value = (self.get)(record);
        match self.max_len {
            Some(max_len) => value.encode_truncated(writer, max_len),
            None => value.encode(writer),
        }
    }

    fn decode_field(&self, record: &mut R, reader: &mut Reader) -> Result<()> {
        (self.get_mut)(record).decode_into(reader)
    }
}

/// A type whose wire form is a map keyed by field name.
///
/// Implement via `#[derive(Record)]`:
///
/// ```rust
/// use recpack::{FieldCodec, Record, WireTag};
///
/// #[derive(Record, Default)]
/// struct Probe {
///     #[record(rename = "Name")]
///     name: String,
///     reading: f64,
/// }
///
/// let fields = <Probe as recpack::Record>::FIELDS;
/// assert_eq!(fields[0].name(), "Name");
/// assert_eq!(fields[1].wire_tag(), WireTag::Double);
/// ```
pub trait Record: Sized + 'static {
    /// Field descriptors in declaration order. Names are unique.
    const FIELDS: &'static [&'static dyn FieldCodec<Self>];

    /// Looks up a descriptor by wire key.
    fn field(name: &[u8]) -> Option<&'static dyn FieldCodec<Self>> {
        Self::FIELDS
            .iter()
            .copied()
            .find(|field| field.name().as_bytes() == name)
    }
}

/// Writes `record` as a map with one entry per descriptor, in declaration order.
pub fn encode_record<R: Record>(record: &R, writer: &mut Writer) -> Result<()> {
    writer.start_map(R::FIELDS.len())?;
    for field in R::FIELDS {
        writer.write_str(field.name())?;
        field.encode_field(record, writer)?;
    }
    writer.finish_map()
}

/// Reads a map into `record`.
///
/// Entries may come in any order and any subset. Unknown keys, and keys longer than
/// [`ReaderConfig::max_key_len`], are skipped together with their value. Members
/// without an entry keep their current value. On error `record` may be partially
/// updated.
pub fn decode_record_into<R: Record>(record: &mut R, reader: &mut Reader) -> Result<()> {
    let found = reader.peek_tag()?;
    if found != WireTag::Map {
        return Err(CodecError::TypeMismatch {
            expected: WireTag::Map,
            found,
        });
    }
    let entries = reader.start_map()?;
    let max_key_len = reader.config().max_key_len;
    for _ in 0..entries {
        let key_len = reader.read_str_len()?;
        if key_len > max_key_len {
            reader.skip_raw(key_len)?;
            reader.skip_value()?;
            tracing::trace!(
                record = std::any::type_name::<R>(),
                key_len,
                max_key_len,
                "skipping oversized key"
            );
            continue;
        }
        let key = reader.read_raw(key_len)?;
        match R::field(&key) {
            Some(field) => field.decode_field(record, reader)?,
            None => {
                reader.skip_value()?;
                tracing::trace!(
                    record = std::any::type_name::<R>(),
                    key = %String::from_utf8_lossy(&key),
                    "skipping unknown field"
                );
            }
        }
    }
    reader.finish_map()
}

/// Object-safe capability shared by every record, so heterogeneous records can be
/// handled uniformly as `&dyn Serializable`.
pub trait Serializable {
    fn serialize(&self, writer: &mut Writer) -> Result<()>;
    fn deserialize(&mut self, reader: &mut Reader) -> Result<()>;
}

impl<R: Record> Serializable for R {
    fn serialize(&self, writer: &mut Writer) -> Result<()> {
        encode_record(self, writer)
    }

    fn deserialize(&mut self, reader: &mut Reader) -> Result<()> {
        decode_record_into(self, reader)
    }
}
