use crate::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

/// Truncates `value` to at most `max_len` bytes without splitting a UTF-8 character.
///
/// For ASCII text the result is exactly `max_len` bytes long.
pub fn truncate_str(value: &str, max_len: usize) -> &str {
    if value.len() <= max_len {
        return value;
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Logs and builds the error returned when no union variant accepts `found`.
/// Called from code generated by `#[derive(Union)]`.
pub fn unresolvable_union(union_name: &'static str, found: WireTag) -> CodecError {
    tracing::debug!(union = union_name, %found, "no union variant accepts wire type");
    CodecError::UnresolvableUnion { union_name, found }
}

/// Peeks the next value and fails with `TypeMismatch` unless its kind is one of `allowed`.
#[inline]
fn expect_one_of(reader: &Reader, expected: WireTag, allowed: &[WireTag]) -> Result<WireTag> {
    let found = reader.peek_tag()?;
    if !allowed.contains(&found) {
        return Err(CodecError::TypeMismatch { expected, found });
    }
    Ok(found)
}

// --- bool ---
impl Encoder for bool {
    const WIRE_TAG: WireTag = WireTag::Bool;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_bool(*self)
    }
}

impl Decoder for bool {
    fn decode(reader: &mut Reader) -> Result<Self> {
        reader.read_bool()
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Bool
    }
}

// --- integers ---
/// Integers are written in the family of their static type and read from either family
/// into the destination's full width. Values that do not fit fail with `OutOfRange`.
macro_rules! impl_integer {
    ($family:ident, $write:ident, $wide:ty, $($t:ty),*) => {$(
        impl Encoder for $t {
            const WIRE_TAG: WireTag = WireTag::$family;

            fn encode(&self, writer: &mut Writer) -> Result<()> {
                writer.$write(*self as $wide)
            }
        }

        impl Decoder for $t {
            fn decode(reader: &mut Reader) -> Result<Self> {
                expect_one_of(reader, WireTag::$family, &[WireTag::Integer, WireTag::UInt])?;
                let value = reader.read_integer()?;
                <$t>::try_from(value).map_err(|_| CodecError::OutOfRange {
                    value,
                    target: stringify!($t),
                })
            }

            fn accepts(tag: WireTag) -> bool {
                tag == WireTag::$family
            }
        }
    )*};
}

impl_integer!(UInt, write_uint, u64, u8, u16, u32, u64, usize);
impl_integer!(Integer, write_int, i64, i8, i16, i32, i64, isize);

// --- floats ---
impl Encoder for f32 {
    const WIRE_TAG: WireTag = WireTag::Float;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_f32(*self)
    }
}

/// A double-precision value is accepted only when it converts to `f32` without loss.
impl Decoder for f32 {
    fn decode(reader: &mut Reader) -> Result<Self> {
        expect_one_of(reader, WireTag::Float, &[WireTag::Float, WireTag::Double])?;
        match reader.read_float()? {
            FloatValue::Single(value) => Ok(value),
            FloatValue::Double(value) => {
                let narrowed = value as f32;
                if value.is_nan() || narrowed as f64 == value {
                    Ok(narrowed)
                } else {
                    Err(CodecError::TypeMismatch {
                        expected: WireTag::Float,
                        found: WireTag::Double,
                    })
                }
            }
        }
    }

    fn accepts(tag: WireTag) -> bool {
        matches!(tag, WireTag::Float | WireTag::Double)
    }
}

impl Encoder for f64 {
    const WIRE_TAG: WireTag = WireTag::Double;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_f64(*self)
    }
}

impl Decoder for f64 {
    fn decode(reader: &mut Reader) -> Result<Self> {
        expect_one_of(reader, WireTag::Double, &[WireTag::Float, WireTag::Double])?;
        match reader.read_float()? {
            FloatValue::Single(value) => Ok(value as f64),
            FloatValue::Double(value) => Ok(value),
        }
    }

    fn accepts(tag: WireTag) -> bool {
        matches!(tag, WireTag::Float | WireTag::Double)
    }
}

// --- text ---
impl Encoder for str {
    const WIRE_TAG: WireTag = WireTag::String;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_str(self)
    }

    fn encode_truncated(&self, writer: &mut Writer, max_len: usize) -> Result<()> {
        writer.write_str(truncate_str(self, max_len))
    }
}

impl Encoder for String {
    const WIRE_TAG: WireTag = WireTag::String;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        self.as_str().encode(writer)
    }

    fn encode_truncated(&self, writer: &mut Writer, max_len: usize) -> Result<()> {
        self.as_str().encode_truncated(writer, max_len)
    }
}

impl Decoder for String {
    fn decode(reader: &mut Reader) -> Result<Self> {
        let mut value = String::new();
        value.decode_into(reader)?;
        Ok(value)
    }

    /// Reuses the existing allocation of `self`.
    fn decode_into(&mut self, reader: &mut Reader) -> Result<()> {
        let len = reader.read_str_len()?;
        let raw = reader.read_raw(len)?;
        let text = std::str::from_utf8(&raw)?;
        self.clear();
        self.push_str(text);
        Ok(())
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::String
    }
}

// --- binary ---
impl Encoder for Bytes {
    const WIRE_TAG: WireTag = WireTag::Binary;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_bin(self)
    }
}

/// Decodes without copying: the result shares the reader's buffer.
impl Decoder for Bytes {
    fn decode(reader: &mut Reader) -> Result<Self> {
        let len = reader.read_bin_len()?;
        reader.read_raw(len)
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Binary
    }
}

// --- Option ---
/// `None` is written as nil, `Some` as the inner value. The static classification is
/// the inner one, which is what a present value looks like on the wire.
impl<T: Encoder> Encoder for Option<T> {
    const WIRE_TAG: WireTag = T::WIRE_TAG;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        match self {
            Some(value) => value.encode(writer),
            None => writer.write_nil(),
        }
    }

    fn encode_truncated(&self, writer: &mut Writer, max_len: usize) -> Result<()> {
        match self {
            Some(value) => value.encode_truncated(writer, max_len),
            None => writer.write_nil(),
        }
    }
}

impl<T: Decoder> Decoder for Option<T> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        if reader.peek_tag()? == WireTag::Nil {
            reader.read_nil()?;
            return Ok(None);
        }
        Ok(Some(T::decode(reader)?))
    }

    fn decode_into(&mut self, reader: &mut Reader) -> Result<()> {
        if reader.peek_tag()? == WireTag::Nil {
            reader.read_nil()?;
            *self = None;
            return Ok(());
        }
        match self {
            Some(value) => value.decode_into(reader),
            None => {
                *self = Some(T::decode(reader)?);
                Ok(())
            }
        }
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Nil || T::accepts(tag)
    }
}

// --- sequences ---
pub(crate) fn encode_seq<'a, T: Encoder + 'a>(
    items: impl IntoIterator<Item = &'a T>,
    len: usize,
    writer: &mut Writer,
) -> Result<()> {
    writer.start_array(len)?;
    for item in items {
        item.encode(writer)?;
    }
    writer.finish_array()
}

/// Reads an array into any collection, one element at a time.
pub(crate) fn decode_seq<T: Decoder, C>(
    reader: &mut Reader,
    with_capacity: impl FnOnce(usize) -> C,
    mut push: impl FnMut(&mut C, T),
) -> Result<C> {
    let len = reader.start_array()?;
    let mut items = with_capacity(len);
    for _ in 0..len {
        push(&mut items, T::decode(reader)?);
    }
    reader.finish_array()?;
    Ok(items)
}

impl<T: Encoder> Encoder for Vec<T> {
    const WIRE_TAG: WireTag = WireTag::Array;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_seq(self, self.len(), writer)
    }
}

impl<T: Decoder> Decoder for Vec<T> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        decode_seq(reader, Vec::with_capacity, Vec::push)
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Array
    }
}

fn start_fixed_array(reader: &mut Reader, expected: usize) -> Result<()> {
    let found = reader.start_array()?;
    if found != expected {
        return Err(CodecError::SizeMismatch { expected, found });
    }
    Ok(())
}

impl<T: Encoder, const N: usize> Encoder for [T; N] {
    const WIRE_TAG: WireTag = WireTag::Array;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_seq(self, N, writer)
    }
}

/// The wire array must hold exactly `N` elements.
impl<T: Decoder, const N: usize> Decoder for [T; N] {
    fn decode(reader: &mut Reader) -> Result<Self> {
        start_fixed_array(reader, N)?;
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(reader)?);
        }
        reader.finish_array()?;
        items
            .try_into()
            .map_err(|items: Vec<T>| CodecError::SizeMismatch {
                expected: N,
                found: items.len(),
            })
    }

    fn decode_into(&mut self, reader: &mut Reader) -> Result<()> {
        start_fixed_array(reader, N)?;
        for slot in self.iter_mut() {
            slot.decode_into(reader)?;
        }
        reader.finish_array()
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Array
    }
}

impl<T: Encoder, S> Encoder for HashSet<T, S> {
    const WIRE_TAG: WireTag = WireTag::Array;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_seq(self, self.len(), writer)
    }
}

impl<T: Decoder + Eq + Hash, S: BuildHasher + Default> Decoder for HashSet<T, S> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        decode_seq(
            reader,
            |len| HashSet::with_capacity_and_hasher(len, S::default()),
            |set, item| {
                set.insert(item);
            },
        )
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Array
    }
}

impl<T: Encoder> Encoder for BTreeSet<T> {
    const WIRE_TAG: WireTag = WireTag::Array;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_seq(self, self.len(), writer)
    }
}

impl<T: Decoder + Ord> Decoder for BTreeSet<T> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        decode_seq(
            reader,
            |_| BTreeSet::new(),
            |set, item| {
                set.insert(item);
            },
        )
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Array
    }
}

// --- maps ---
pub(crate) fn encode_map<'a, K: Encoder + 'a, V: Encoder + 'a>(
    entries: impl IntoIterator<Item = (&'a K, &'a V)>,
    len: usize,
    writer: &mut Writer,
) -> Result<()> {
    writer.start_map(len)?;
    for (key, value) in entries {
        key.encode(writer)?;
        value.encode(writer)?;
    }
    writer.finish_map()
}

/// Reads a map entry by entry. Later duplicates of a key overwrite earlier ones.
pub(crate) fn decode_map<K: Decoder, V: Decoder, M>(
    reader: &mut Reader,
    with_capacity: impl FnOnce(usize) -> M,
    mut insert: impl FnMut(&mut M, K, V),
) -> Result<M> {
    let len = reader.start_map()?;
    let mut map = with_capacity(len);
    for _ in 0..len {
        let key = K::decode(reader)?;
        let value = V::decode(reader)?;
        insert(&mut map, key, value);
    }
    reader.finish_map()?;
    Ok(map)
}

impl<K: Encoder, V: Encoder, S> Encoder for HashMap<K, V, S> {
    const WIRE_TAG: WireTag = WireTag::Map;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_map(self, self.len(), writer)
    }
}

impl<K: Decoder + Eq + Hash, V: Decoder, S: BuildHasher + Default> Decoder for HashMap<K, V, S> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        decode_map(
            reader,
            |len| HashMap::with_capacity_and_hasher(len, S::default()),
            |map, key, value| {
                map.insert(key, value);
            },
        )
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Map
    }
}

impl<K: Encoder, V: Encoder> Encoder for BTreeMap<K, V> {
    const WIRE_TAG: WireTag = WireTag::Map;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_map(self, self.len(), writer)
    }
}

impl<K: Decoder + Ord, V: Decoder> Decoder for BTreeMap<K, V> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        decode_map(
            reader,
            |_| BTreeMap::new(),
            |map, key, value| {
                map.insert(key, value);
            },
        )
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Map
    }
}

// --- pointers ---
impl<T: Encoder + ?Sized> Encoder for &T {
    const WIRE_TAG: WireTag = T::WIRE_TAG;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        (**self).encode(writer)
    }

    fn encode_truncated(&self, writer: &mut Writer, max_len: usize) -> Result<()> {
        (**self).encode_truncated(writer, max_len)
    }
}

impl<T: Encoder + ?Sized> Encoder for Box<T> {
    const WIRE_TAG: WireTag = T::WIRE_TAG;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        (**self).encode(writer)
    }

    fn encode_truncated(&self, writer: &mut Writer, max_len: usize) -> Result<()> {
        (**self).encode_truncated(writer, max_len)
    }
}

impl<T: Decoder> Decoder for Box<T> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        Ok(Box::new(T::decode(reader)?))
    }

    fn decode_into(&mut self, reader: &mut Reader) -> Result<()> {
        (**self).decode_into(reader)
    }

    fn accepts(tag: WireTag) -> bool {
        T::accepts(tag)
    }
}

impl<T: Encoder + ?Sized> Encoder for Arc<T> {
    const WIRE_TAG: WireTag = T::WIRE_TAG;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        (**self).encode(writer)
    }

    fn encode_truncated(&self, writer: &mut Writer, max_len: usize) -> Result<()> {
        (**self).encode_truncated(writer, max_len)
    }
}

impl<T: Decoder> Decoder for Arc<T> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        Ok(Arc::new(T::decode(reader)?))
    }

    fn accepts(tag: WireTag) -> bool {
        T::accepts(tag)
    }
}
