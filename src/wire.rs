//! MessagePack wire layer.
//!
//! [`Writer`] and [`Reader`] are the byte-level collaborators of the type handlers.
//! Markers and length prefixes are produced and parsed by `rmp`. This module adds
//! aggregate bookkeeping, the capacity limit, the depth guard and nested skipping.

use crate::{CodecError, Result, StreamError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rmp::encode::ValueWriteError;
use rmp::Marker;
use std::fmt;

/// Wire-level value kinds.
///
/// Every handler carries one of these as its static classification
/// ([`crate::Encoder::WIRE_TAG`]), and [`Reader::peek_tag`] classifies the next marker
/// into one of `Nil..=Extension`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireTag {
    /// No single wire kind (unions), never produced by the reader.
    Missing,
    Nil,
    Bool,
    /// Signed family: negative fixint and `int 8/16/32/64`.
    Integer,
    /// Unsigned family: positive fixint and `uint 8/16/32/64`.
    UInt,
    Float,
    Double,
    String,
    Binary,
    Array,
    Map,
    Extension,
    /// Static classification of records; their wire form is a map.
    CustomRecord,
}

impl WireTag {
    /// Classifies a marker byte. Returns `None` for the reserved `0xc1`.
    pub fn from_marker(marker: u8) -> Option<WireTag> {
        let tag = match Marker::from_u8(marker) {
            Marker::FixPos(_) | Marker::U8 | Marker::U16 | Marker::U32 | Marker::U64 => {
                WireTag::UInt
            }
            Marker::FixNeg(_) | Marker::I8 | Marker::I16 | Marker::I32 | Marker::I64 => {
                WireTag::Integer
            }
            Marker::Null => WireTag::Nil,
            Marker::True | Marker::False => WireTag::Bool,
            Marker::F32 => WireTag::Float,
            Marker::F64 => WireTag::Double,
            Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => WireTag::String,
            Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => WireTag::Binary,
            Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => WireTag::Array,
            Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => WireTag::Map,
            Marker::FixExt1
            | Marker::FixExt2
            | Marker::FixExt4
            | Marker::FixExt8
            | Marker::FixExt16
            | Marker::Ext8
            | Marker::Ext16
            | Marker::Ext32 => WireTag::Extension,
            Marker::Reserved => return None,
        };
        Some(tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            WireTag::Missing => "missing",
            WireTag::Nil => "nil",
            WireTag::Bool => "bool",
            WireTag::Integer => "integer",
            WireTag::UInt => "uint",
            WireTag::Float => "float",
            WireTag::Double => "double",
            WireTag::String => "string",
            WireTag::Binary => "binary",
            WireTag::Array => "array",
            WireTag::Map => "map",
            WireTag::Extension => "extension",
            WireTag::CustomRecord => "record",
        }
    }
}

impl fmt::Display for WireTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded floating-point value, keeping the precision it was written with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FloatValue {
    Single(f32),
    Double(f64),
}

type Sink<'a> = bytes::buf::Writer<&'a mut BytesMut>;

/// MessagePack length prefixes are at most 32 bits wide.
fn prefix_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| StreamError::LengthOverflow(len).into())
}

#[derive(Debug)]
struct OpenAggregate {
    kind: WireTag,
    remaining: u64,
}

/// Writes MessagePack values into a growable or fixed-capacity buffer.
///
/// Arrays and maps are opened with their element count and must be closed with the
/// matching `finish_*` call once exactly that many values were written. The writer
/// checks this as it goes and [`Writer::finish`] refuses to finalize a session that
/// still has open aggregates.
#[derive(Debug, Default)]
pub struct Writer {
    buf: BytesMut,
    limit: Option<usize>,
    open: Vec<OpenAggregate>,
}

impl Writer {
    /// Creates an unbounded writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer bound to a fixed capacity. Any write that would grow the
    /// output past `capacity` bytes fails with [`StreamError::BufferFull`].
    pub fn with_limit(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            limit: Some(capacity),
            open: Vec::new(),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finalizes the session and returns the encoded bytes.
    ///
    /// # Errors
    /// Returns [`CodecError::SessionFinalize`] if an array or map is still open.
    pub fn finish(self) -> Result<Bytes> {
        if !self.open.is_empty() {
            return Err(CodecError::SessionFinalize {
                open: self.open.len(),
            });
        }
        Ok(self.buf.freeze())
    }

    /// Runs one `rmp` encode call for a value header, then appends `payload`.
    /// On a capacity overrun the header is rolled back.
    fn emit<T>(
        &mut self,
        header: impl FnOnce(&mut Sink<'_>) -> std::result::Result<T, ValueWriteError>,
        payload: &[u8],
    ) -> Result<T> {
        let start = self.buf.len();
        let written = header(&mut (&mut self.buf).writer()).map_err(StreamError::from)?;
        if let Some(capacity) = self.limit {
            let needed = self.buf.len() + payload.len();
            if needed > capacity {
                self.buf.truncate(start);
                return Err(StreamError::BufferFull { capacity, needed }.into());
            }
        }
        self.buf.extend_from_slice(payload);
        Ok(written)
    }

    /// Counts one value against the innermost open aggregate.
    fn begin_value(&mut self) -> Result<()> {
        if let Some(top) = self.open.last_mut() {
            if top.remaining == 0 {
                return Err(StreamError::AggregateOverflow { kind: top.kind }.into());
            }
            top.remaining -= 1;
        }
        Ok(())
    }

    pub fn write_nil(&mut self) -> Result<()> {
        self.begin_value()?;
        self.emit(
            |out| rmp::encode::write_nil(out).map_err(ValueWriteError::InvalidMarkerWrite),
            &[],
        )
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.begin_value()?;
        self.emit(
            |out| rmp::encode::write_bool(out, value).map_err(ValueWriteError::InvalidMarkerWrite),
            &[],
        )
    }

    /// Writes an unsigned integer in the smallest unsigned-family form.
    pub fn write_uint(&mut self, value: u64) -> Result<()> {
        self.begin_value()?;
        self.emit(|out| rmp::encode::write_uint(out, value), &[])?;
        Ok(())
    }

    /// Writes a signed integer in the smallest signed-family form.
    ///
    /// Non-negative values are written as `int 8..64` rather than positive fixint, so
    /// a signed value is always classified as [`WireTag::Integer`] on the way back.
    pub fn write_int(&mut self, value: i64) -> Result<()> {
        self.begin_value()?;
        self.emit(
            |out| {
                if (-32..0).contains(&value) {
                    rmp::encode::write_nfix(out, value as i8)
                        .map_err(ValueWriteError::InvalidMarkerWrite)
                } else if let Ok(v) = i8::try_from(value) {
                    rmp::encode::write_i8(out, v)
                } else if let Ok(v) = i16::try_from(value) {
                    rmp::encode::write_i16(out, v)
                } else if let Ok(v) = i32::try_from(value) {
                    rmp::encode::write_i32(out, v)
                } else {
                    rmp::encode::write_i64(out, value)
                }
            },
            &[],
        )
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.begin_value()?;
        self.emit(|out| rmp::encode::write_f32(out, value), &[])
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.begin_value()?;
        self.emit(|out| rmp::encode::write_f64(out, value), &[])
    }

    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_str_bytes(value.as_bytes())
    }

    /// Writes raw bytes as a wire string. The bytes are not checked for UTF-8.
    pub fn write_str_bytes(&mut self, raw: &[u8]) -> Result<()> {
        self.begin_value()?;
        let len = prefix_len(raw.len())?;
        self.emit(|out| rmp::encode::write_str_len(out, len), raw)?;
        Ok(())
    }

    pub fn write_bin(&mut self, data: &[u8]) -> Result<()> {
        self.begin_value()?;
        let len = prefix_len(data.len())?;
        self.emit(|out| rmp::encode::write_bin_len(out, len), data)?;
        Ok(())
    }

    /// Writes an extension value. Payloads of 1, 2, 4, 8 or 16 bytes use the
    /// `fixext` forms.
    pub fn write_ext(&mut self, kind: i8, payload: &[u8]) -> Result<()> {
        self.begin_value()?;
        let len = prefix_len(payload.len())?;
        self.emit(|out| rmp::encode::write_ext_meta(out, len, kind), payload)?;
        Ok(())
    }

    /// Opens an array of `len` elements.
    pub fn start_array(&mut self, len: usize) -> Result<()> {
        self.begin_value()?;
        let count = prefix_len(len)?;
        self.emit(|out| rmp::encode::write_array_len(out, count), &[])?;
        self.open.push(OpenAggregate {
            kind: WireTag::Array,
            remaining: len as u64,
        });
        Ok(())
    }

    /// Opens a map of `len` key/value entries.
    pub fn start_map(&mut self, len: usize) -> Result<()> {
        self.begin_value()?;
        let count = prefix_len(len)?;
        self.emit(|out| rmp::encode::write_map_len(out, count), &[])?;
        self.open.push(OpenAggregate {
            kind: WireTag::Map,
            remaining: len as u64 * 2,
        });
        Ok(())
    }

    pub fn finish_array(&mut self) -> Result<()> {
        self.close(WireTag::Array)
    }

    pub fn finish_map(&mut self) -> Result<()> {
        self.close(WireTag::Map)
    }

    fn close(&mut self, expected: WireTag) -> Result<()> {
        match self.open.pop() {
            Some(top) if top.kind == expected && top.remaining == 0 => Ok(()),
            Some(top) if top.kind == expected => Err(StreamError::UnbalancedAggregate {
                kind: top.kind,
                remaining: top.remaining,
            }
            .into()),
            _ => Err(StreamError::MismatchedFinish { expected }.into()),
        }
    }
}

/// Limits applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Record keys longer than this many bytes are skipped together with their value.
    pub max_key_len: usize,
    /// Maximum number of nested arrays/maps open at the same time.
    ///
    /// A record is one map, and a record held in a `Vec` field of its parent costs
    /// two levels (the array and the map). With the default of 128 a chain of
    /// records nested directly in each other decodes 128 levels deep, and a chain
    /// through `Vec` fields decodes 63 levels below the root record.
    pub max_depth: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_key_len: 256,
            max_depth: 128,
        }
    }
}

/// Reads MessagePack values from a buffer.
///
/// Payload slices are split off the underlying [`Bytes`] without copying.
#[derive(Debug, Clone)]
pub struct Reader {
    buf: Bytes,
    config: ReaderConfig,
    depth: usize,
}

impl Reader {
    pub fn new(buf: impl Into<Bytes>) -> Self {
        Self::with_config(buf, ReaderConfig::default())
    }

    pub fn with_config(buf: impl Into<Bytes>, config: ReaderConfig) -> Self {
        Self {
            buf: buf.into(),
            config,
            depth: 0,
        }
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Finalizes the session and returns the unread tail of the buffer.
    ///
    /// # Errors
    /// Returns [`CodecError::SessionFinalize`] if an array or map is still open.
    pub fn finish(self) -> Result<Bytes> {
        if self.depth != 0 {
            return Err(CodecError::SessionFinalize { open: self.depth });
        }
        Ok(self.buf)
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.buf.remaining();
        if remaining < needed {
            return Err(StreamError::InsufficientData { needed, remaining }.into());
        }
        Ok(())
    }

    /// Returns the next marker byte without consuming it.
    pub fn peek_marker(&self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf[0])
    }

    /// Classifies the next value without consuming it.
    pub fn peek_tag(&self) -> Result<WireTag> {
        let marker = self.peek_marker()?;
        WireTag::from_marker(marker).ok_or_else(|| StreamError::InvalidMarker(marker).into())
    }

    /// Fails with `TypeMismatch` unless the next value is of kind `expected`.
    fn expect(&self, expected: WireTag) -> Result<()> {
        let found = self.peek_tag()?;
        if found != expected {
            return Err(CodecError::TypeMismatch { expected, found });
        }
        Ok(())
    }

    /// Runs one `rmp` decode call against the unread bytes and consumes what it read.
    fn read_header<T, E>(
        &mut self,
        read: impl FnOnce(&mut &[u8]) -> std::result::Result<T, E>,
    ) -> Result<T>
    where
        StreamError: From<E>,
    {
        let mut cursor: &[u8] = &self.buf;
        let value = read(&mut cursor).map_err(StreamError::from)?;
        let consumed = self.buf.len() - cursor.len();
        self.buf.advance(consumed);
        Ok(value)
    }

    pub fn read_nil(&mut self) -> Result<()> {
        self.expect(WireTag::Nil)?;
        self.read_header(|rd| rmp::decode::read_nil(rd))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.expect(WireTag::Bool)?;
        self.read_header(|rd| rmp::decode::read_bool(rd))
    }

    /// Reads an integer of either family, widened to `i128` so that every `u64` and
    /// `i64` value is representable.
    pub fn read_integer(&mut self) -> Result<i128> {
        let found = self.peek_tag()?;
        if !matches!(found, WireTag::Integer | WireTag::UInt) {
            return Err(CodecError::TypeMismatch {
                expected: WireTag::Integer,
                found,
            });
        }
        self.read_header(|rd| rmp::decode::read_int::<i128, _>(rd))
    }

    /// Reads a single- or double-precision float.
    pub fn read_float(&mut self) -> Result<FloatValue> {
        match self.peek_tag()? {
            WireTag::Float => self
                .read_header(|rd| rmp::decode::read_f32(rd))
                .map(FloatValue::Single),
            WireTag::Double => self
                .read_header(|rd| rmp::decode::read_f64(rd))
                .map(FloatValue::Double),
            found => Err(CodecError::TypeMismatch {
                expected: WireTag::Double,
                found,
            }),
        }
    }

    /// Consumes a string header and returns the payload length. The payload is
    /// guaranteed to be present.
    pub fn read_str_len(&mut self) -> Result<usize> {
        self.expect(WireTag::String)?;
        let len = self.read_header(|rd| rmp::decode::read_str_len(rd))? as usize;
        self.ensure(len)?;
        Ok(len)
    }

    /// Consumes a binary header and returns the payload length.
    pub fn read_bin_len(&mut self) -> Result<usize> {
        self.expect(WireTag::Binary)?;
        let len = self.read_header(|rd| rmp::decode::read_bin_len(rd))? as usize;
        self.ensure(len)?;
        Ok(len)
    }

    /// Consumes an extension header and returns `(kind, payload length)`.
    pub fn read_ext_header(&mut self) -> Result<(i8, usize)> {
        self.expect(WireTag::Extension)?;
        let meta = self.read_header(|rd| rmp::decode::read_ext_meta(rd))?;
        let len = meta.size as usize;
        self.ensure(len)?;
        Ok((meta.typeid, len))
    }

    /// Splits `len` raw payload bytes off the buffer.
    pub fn read_raw(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Discards `len` raw payload bytes.
    pub fn skip_raw(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.buf.advance(len);
        Ok(())
    }

    /// Reads an array header. Every element needs at least one byte, so a count
    /// larger than what is left is rejected before anyone allocates for it.
    fn read_array_header(&mut self) -> Result<usize> {
        self.expect(WireTag::Array)?;
        let len = self.read_header(|rd| rmp::decode::read_array_len(rd))? as usize;
        self.ensure(len)?;
        Ok(len)
    }

    fn read_map_header(&mut self) -> Result<usize> {
        self.expect(WireTag::Map)?;
        let len = self.read_header(|rd| rmp::decode::read_map_len(rd))? as usize;
        self.ensure(len.saturating_mul(2))?;
        Ok(len)
    }

    fn enter(&mut self) -> Result<()> {
        if self.depth >= self.config.max_depth {
            return Err(CodecError::DepthLimitExceeded {
                limit: self.config.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self, expected: WireTag) -> Result<()> {
        self.depth = self
            .depth
            .checked_sub(1)
            .ok_or(StreamError::MismatchedFinish { expected })?;
        Ok(())
    }

    /// Opens an array and returns its declared element count.
    pub fn start_array(&mut self) -> Result<usize> {
        let len = self.read_array_header()?;
        self.enter()?;
        Ok(len)
    }

    /// Opens a map and returns its declared entry count.
    pub fn start_map(&mut self) -> Result<usize> {
        let len = self.read_map_header()?;
        self.enter()?;
        Ok(len)
    }

    pub fn finish_array(&mut self) -> Result<()> {
        self.leave(WireTag::Array)
    }

    pub fn finish_map(&mut self) -> Result<()> {
        self.leave(WireTag::Map)
    }

    /// Discards the next complete value, including everything nested inside it.
    ///
    /// Works with a pending-value counter instead of recursion, so hostile nesting
    /// cannot exhaust the stack.
    pub fn skip_value(&mut self) -> Result<()> {
        let mut pending: usize = 1;
        while pending > 0 {
            pending -= 1;
            match self.peek_tag()? {
                WireTag::Nil | WireTag::Bool => self.buf.advance(1),
                WireTag::Integer | WireTag::UInt => {
                    self.read_integer()?;
                }
                WireTag::Float | WireTag::Double => {
                    self.read_float()?;
                }
                WireTag::String => {
                    let len = self.read_str_len()?;
                    self.buf.advance(len);
                }
                WireTag::Binary => {
                    let len = self.read_bin_len()?;
                    self.buf.advance(len);
                }
                WireTag::Extension => {
                    let (_, len) = self.read_ext_header()?;
                    self.buf.advance(len);
                }
                WireTag::Array => {
                    let len = self.read_array_header()?;
                    pending += len;
                }
                WireTag::Map => {
                    let len = self.read_map_header()?;
                    pending += len * 2;
                }
                WireTag::Missing | WireTag::CustomRecord => {
                    return Err(StreamError::InvalidMarker(self.buf[0]).into());
                }
            }
            self.ensure(pending)?;
        }
        Ok(())
    }
}
