//! Property-based tests for the codec.
//!
//! - Integers survive a round trip at their full width and keep their wire family
//! - Truncated strings are valid UTF-8 prefixes within the byte bound
//! - Records round-trip for arbitrary contents
//! - Arbitrary input never panics the decoder

use proptest::prelude::*;
use recpack::{from_bytes, to_bytes, truncate_str, Reader, Record, WireTag, Writer};

#[derive(Record, Default, Debug, Clone, PartialEq)]
struct Sample {
    id: u64,
    offset: i32,
    label: String,
    values: Vec<f64>,
    flag: Option<bool>,
}

fn sample_strategy() -> impl Strategy<Value = Sample> {
    (
        any::<u64>(),
        any::<i32>(),
        ".{0,40}",
        prop::collection::vec(-1.0e9f64..1.0e9, 0..20),
        any::<Option<bool>>(),
    )
        .prop_map(|(id, offset, label, values, flag)| Sample {
            id,
            offset,
            label,
            values,
            flag,
        })
}

#[test]
fn prop_unsigned_roundtrip_keeps_family() {
    proptest!(|(value in any::<u64>())| {
        let bytes = to_bytes(&value).unwrap();
        prop_assert_eq!(Reader::new(bytes.clone()).peek_tag().unwrap(), WireTag::UInt);
        let decoded: u64 = from_bytes(bytes).unwrap();
        prop_assert_eq!(decoded, value);
    });
}

#[test]
fn prop_signed_roundtrip_keeps_family() {
    proptest!(|(value in any::<i64>())| {
        let bytes = to_bytes(&value).unwrap();
        prop_assert_eq!(Reader::new(bytes.clone()).peek_tag().unwrap(), WireTag::Integer);
        let decoded: i64 = from_bytes(bytes).unwrap();
        prop_assert_eq!(decoded, value);
    });
}

#[test]
fn prop_narrow_decode_matches_try_from() {
    proptest!(|(value in any::<i64>())| {
        let decoded = from_bytes::<i16>(to_bytes(&value).unwrap()).ok();
        prop_assert_eq!(decoded, i16::try_from(value).ok());
    });
}

#[test]
fn prop_truncation_is_bounded_prefix() {
    proptest!(|(text in ".{0,64}", max_len in 0usize..80)| {
        let truncated = truncate_str(&text, max_len);
        prop_assert!(truncated.len() <= max_len);
        prop_assert!(text.starts_with(truncated));
        // nothing more fits without splitting a character
        if truncated.len() < text.len() {
            let next = text[truncated.len()..].chars().next().unwrap();
            prop_assert!(truncated.len() + next.len_utf8() > max_len);
        }

        let mut writer = Writer::new();
        recpack::Encoder::encode_truncated(&text, &mut writer, max_len).unwrap();
        let decoded: String = from_bytes(writer.finish().unwrap()).unwrap();
        prop_assert_eq!(decoded.as_str(), truncated);
    });
}

#[test]
fn prop_record_roundtrip() {
    proptest!(|(sample in sample_strategy())| {
        let decoded: Sample = from_bytes(to_bytes(&sample).unwrap()).unwrap();
        prop_assert_eq!(decoded, sample);
    });
}

#[test]
fn prop_arbitrary_input_never_panics() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..256))| {
        let _ = from_bytes::<Sample>(bytes.clone());
        let mut reader = Reader::new(bytes);
        let _ = reader.skip_value();
    });
}
