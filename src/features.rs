#[cfg(feature = "ahash")]
use ahash::{AHashMap, AHashSet};
#[cfg(feature = "chrono")]
use chrono::{DateTime, Utc};
#[cfg(feature = "indexmap")]
use indexmap::{IndexMap, IndexSet};
#[cfg(feature = "smol_str")]
use smol_str::SmolStr;
#[cfg(feature = "indexmap")]
use std::hash::BuildHasher;
#[cfg(any(feature = "indexmap", feature = "ahash"))]
use std::hash::Hash;
#[cfg(feature = "uuid")]
use uuid::Uuid;

#[allow(unused_imports)]
use crate::core::*;
#[allow(unused_imports)]
use crate::*;

// --- IndexSet ---
#[cfg(feature = "indexmap")]
impl<T: Encoder, S> Encoder for IndexSet<T, S> {
    const WIRE_TAG: WireTag = WireTag::Array;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_seq(self, self.len(), writer)
    }
}

#[cfg(feature = "indexmap")]
impl<T: Decoder + Eq + Hash, S: BuildHasher + Default> Decoder for IndexSet<T, S> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        decode_seq(
            reader,
            |len| IndexSet::with_capacity_and_hasher(len, S::default()),
            |set, item| {
                set.insert(item);
            },
        )
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Array
    }
}

// --- IndexMap ---
/// Entries are written in insertion order.
#[cfg(feature = "indexmap")]
impl<K: Encoder, V: Encoder, S> Encoder for IndexMap<K, V, S> {
    const WIRE_TAG: WireTag = WireTag::Map;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_map(self, self.len(), writer)
    }
}

#[cfg(feature = "indexmap")]
impl<K: Decoder + Eq + Hash, V: Decoder, S: BuildHasher + Default> Decoder for IndexMap<K, V, S> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        decode_map(
            reader,
            |len| IndexMap::with_capacity_and_hasher(len, S::default()),
            |map, key, value| {
                map.insert(key, value);
            },
        )
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Map
    }
}

// --- AHashMap ---
#[cfg(feature = "ahash")]
impl<K: Encoder, V: Encoder> Encoder for AHashMap<K, V> {
    const WIRE_TAG: WireTag = WireTag::Map;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_map(self.iter(), self.len(), writer)
    }
}

#[cfg(feature = "ahash")]
impl<K: Decoder + Eq + Hash, V: Decoder> Decoder for AHashMap<K, V> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        decode_map(reader, AHashMap::with_capacity, |map, key, value| {
            map.insert(key, value);
        })
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Map
    }
}

// --- AHashSet ---
#[cfg(feature = "ahash")]
impl<T: Encoder> Encoder for AHashSet<T> {
    const WIRE_TAG: WireTag = WireTag::Array;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        encode_seq(self.iter(), self.len(), writer)
    }
}

#[cfg(feature = "ahash")]
impl<T: Decoder + Eq + Hash> Decoder for AHashSet<T> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        decode_seq(reader, AHashSet::with_capacity, |set, item| {
            set.insert(item);
        })
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Array
    }
}

// --- SmolStr ---
#[cfg(feature = "smol_str")]
impl Encoder for SmolStr {
    const WIRE_TAG: WireTag = WireTag::String;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_str(self.as_str())
    }

    fn encode_truncated(&self, writer: &mut Writer, max_len: usize) -> Result<()> {
        writer.write_str(truncate_str(self.as_str(), max_len))
    }
}

#[cfg(feature = "smol_str")]
impl Decoder for SmolStr {
    fn decode(reader: &mut Reader) -> Result<Self> {
        let len = reader.read_str_len()?;
        let raw = reader.read_raw(len)?;
        Ok(SmolStr::new(std::str::from_utf8(&raw)?))
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::String
    }
}

// --- Uuid ---
/// Written as 16 raw bytes.
#[cfg(feature = "uuid")]
impl Encoder for Uuid {
    const WIRE_TAG: WireTag = WireTag::Binary;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_bin(self.as_bytes())
    }
}

#[cfg(feature = "uuid")]
impl Decoder for Uuid {
    fn decode(reader: &mut Reader) -> Result<Self> {
        let len = reader.read_bin_len()?;
        if len != 16 {
            return Err(CodecError::SizeMismatch {
                expected: 16,
                found: len,
            });
        }
        let raw = reader.read_raw(len)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&raw);
        Ok(Uuid::from_bytes(bytes))
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Binary
    }
}

// --- DateTime<Utc> ---
/// Extension type code of the MessagePack timestamp.
#[cfg(feature = "chrono")]
pub const EXT_TIMESTAMP: i8 = -1;

/// Written as the MessagePack timestamp extension, picking the 32-, 64- or 96-bit form.
#[cfg(feature = "chrono")]
impl Encoder for DateTime<Utc> {
    const WIRE_TAG: WireTag = WireTag::Extension;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        let seconds = self.timestamp();
        let nanos = self.timestamp_subsec_nanos();
        // 64-bit form: 30 bits of nanoseconds over 34 bits of seconds.
        if seconds >> 34 == 0 && nanos < (1 << 30) {
            let packed = ((nanos as u64) << 34) | seconds as u64;
            if packed >> 32 == 0 {
                writer.write_ext(EXT_TIMESTAMP, &(packed as u32).to_be_bytes())
            } else {
                writer.write_ext(EXT_TIMESTAMP, &packed.to_be_bytes())
            }
        } else {
            let mut payload = [0u8; 12];
            payload[..4].copy_from_slice(&nanos.to_be_bytes());
            payload[4..].copy_from_slice(&seconds.to_be_bytes());
            writer.write_ext(EXT_TIMESTAMP, &payload)
        }
    }
}

#[cfg(feature = "chrono")]
impl Decoder for DateTime<Utc> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        use bytes::Buf;

        let (kind, len) = reader.read_ext_header()?;
        if kind != EXT_TIMESTAMP {
            reader.skip_raw(len)?;
            return Err(CodecError::UnexpectedExtension {
                expected: EXT_TIMESTAMP,
                found: kind,
            });
        }
        let mut payload = reader.read_raw(len)?;
        let (seconds, nanos) = match len {
            4 => (payload.get_u32() as i64, 0),
            8 => {
                let packed = payload.get_u64();
                ((packed & ((1 << 34) - 1)) as i64, (packed >> 34) as u32)
            }
            12 => {
                let nanos = payload.get_u32();
                (payload.get_i64(), nanos)
            }
            found => {
                return Err(CodecError::SizeMismatch {
                    expected: 12,
                    found,
                })
            }
        };
        DateTime::from_timestamp(seconds, nanos).ok_or(CodecError::OutOfRange {
            value: seconds as i128,
            target: "DateTime<Utc>",
        })
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Extension
    }
}
