use recpack::{from_bytes, to_bytes, CodecError, Decoder, Extension, Reader, WireTag, Writer};

#[test]
fn test_extension_roundtrip() {
    let value = Extension::<4>::with_data(0x2a, [1, 2, 3, 4]);
    let bytes = to_bytes(&value).unwrap();
    // fixext4, type, payload
    assert_eq!(&bytes[..], &[0xd6, 0x2a, 1, 2, 3, 4]);
    let decoded: Extension<4> = from_bytes(bytes).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn test_extension_odd_capacity_uses_ext8() {
    let value = Extension::<3>::with_data(-5, [9, 8, 7]);
    let bytes = to_bytes(&value).unwrap();
    assert_eq!(&bytes[..], &[0xc7, 3, 0xfb, 9, 8, 7]);
    let decoded: Extension<3> = from_bytes(bytes).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn test_payload_larger_than_capacity_leaves_destination_untouched() {
    let mut writer = Writer::new();
    writer.write_ext(7, &[1, 2]).unwrap();
    let bytes = writer.finish().unwrap();

    let mut status = Extension::<1>::new(0x2a);
    status.data[0] = 3;
    let mut reader = Reader::new(bytes);
    let result = status.decode_into(&mut reader);
    assert!(matches!(
        result,
        Err(CodecError::SizeMismatch {
            expected: 1,
            found: 2
        })
    ));
    assert_eq!(status.kind, 0x2a);
    assert_eq!(status.data, [3]);
}

#[test]
fn test_shorter_payload_zero_fills() {
    let mut writer = Writer::new();
    writer.write_ext(1, &[0xaa, 0xbb]).unwrap();
    let bytes = writer.finish().unwrap();

    let mut value = Extension::<4>::with_data(0, [0xff; 4]);
    value.decode_into(&mut Reader::new(bytes)).unwrap();
    assert_eq!(value.kind, 1);
    assert_eq!(value.data, [0xaa, 0xbb, 0, 0]);
}

#[test]
fn test_extension_type_mismatch() {
    assert!(matches!(
        from_bytes::<Extension<1>>(to_bytes(&1u8).unwrap()),
        Err(CodecError::TypeMismatch {
            expected: WireTag::Extension,
            found: WireTag::UInt
        })
    ));
}

#[test]
fn test_large_extension_payload() {
    let value = Extension::<300>::with_data(12, [5; 300]);
    let bytes = to_bytes(&value).unwrap();
    // ext16, length 300
    assert_eq!(&bytes[..4], &[0xc8, 0x01, 0x2c, 12]);
    let decoded: Extension<300> = from_bytes(bytes).unwrap();
    assert_eq!(decoded, value);
}
