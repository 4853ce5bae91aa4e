use crate::*;

/// A typed extension value with a fixed-capacity payload.
///
/// `N` is an upper bound: decoding a shorter payload fills the prefix of `data` and
/// zeroes the rest, while a payload longer than `N` fails with `SizeMismatch` and
/// leaves the destination untouched. The whole `N`-byte buffer is written on encode.
///
/// ```rust
/// use recpack::{from_bytes, to_bytes, Extension};
///
/// let status = Extension::<1>::with_data(0x2a, [2]);
/// let decoded: Extension<1> = from_bytes(to_bytes(&status).unwrap()).unwrap();
/// assert_eq!(decoded, status);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extension<const N: usize> {
    /// Application-defined type code.
    pub kind: i8,
    pub data: [u8; N],
}

impl<const N: usize> Extension<N> {
    /// Creates an extension of type `kind` with a zeroed payload.
    pub fn new(kind: i8) -> Self {
        Self { kind, data: [0; N] }
    }

    pub fn with_data(kind: i8, data: [u8; N]) -> Self {
        Self { kind, data }
    }
}

impl<const N: usize> Default for Extension<N> {
    fn default() -> Self {
        Self::new(0)
    }
}

impl<const N: usize> Encoder for Extension<N> {
    const WIRE_TAG: WireTag = WireTag::Extension;

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_ext(self.kind, &self.data)
    }
}

impl<const N: usize> Decoder for Extension<N> {
    fn decode(reader: &mut Reader) -> Result<Self> {
        let mut value = Self::default();
        value.decode_into(reader)?;
        Ok(value)
    }

    fn decode_into(&mut self, reader: &mut Reader) -> Result<()> {
        let (kind, len) = reader.read_ext_header()?;
        if len > N {
            reader.skip_raw(len)?;
            return Err(CodecError::SizeMismatch {
                expected: N,
                found: len,
            });
        }
        let payload = reader.read_raw(len)?;
        self.data[..len].copy_from_slice(&payload);
        self.data[len..].fill(0);
        self.kind = kind;
        Ok(())
    }

    fn accepts(tag: WireTag) -> bool {
        tag == WireTag::Extension
    }
}
