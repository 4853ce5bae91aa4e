//! Buffer lifecycle helpers.
//!
//! A session binds a writer or reader to a caller buffer for exactly one body call
//! and always finalizes it, whatever the body returned.

use crate::*;

/// Runs `body` against a writer bounded by `buffer.len()` and copies the finalized
/// bytes into `buffer`. Returns the number of bytes written.
///
/// The session is finalized on every path. When `body` fails its error is returned
/// and the finalize outcome is only logged.
pub fn write_session<F>(buffer: &mut [u8], body: F) -> Result<usize>
where
    F: FnOnce(&mut Writer) -> Result<()>,
{
    let mut writer = Writer::with_limit(buffer.len());
    let outcome = body(&mut writer);
    let finished = writer.finish();
    match (outcome, finished) {
        (Ok(()), Ok(bytes)) => {
            buffer[..bytes.len()].copy_from_slice(&bytes);
            Ok(bytes.len())
        }
        (Ok(()), Err(err)) => {
            tracing::warn!(%err, "write session failed to finalize");
            Err(err)
        }
        (Err(err), finished) => {
            if let Err(finalize) = finished {
                tracing::debug!(%err, %finalize, "write session finalize failed after encode error");
            }
            Err(err)
        }
    }
}

/// Runs `body` against a reader over `buffer` and finalizes the session.
///
/// Decoded binary values own their bytes, so `buffer` is copied once into a shared
/// [`Bytes`]. Callers that already hold a `Bytes` should use [`read_shared_session`],
/// which reads in place.
///
/// Trailing bytes after the value are ignored.
pub fn read_session<T, F>(buffer: &[u8], config: ReaderConfig, body: F) -> Result<T>
where
    F: FnOnce(&mut Reader) -> Result<T>,
{
    read_shared_session(Bytes::copy_from_slice(buffer), config, body)
}

/// Like [`read_session`] over a shared buffer, without copying it. Binary values
/// decoded in `body` are slices of `buffer`.
pub fn read_shared_session<T, F>(buffer: Bytes, config: ReaderConfig, body: F) -> Result<T>
where
    F: FnOnce(&mut Reader) -> Result<T>,
{
    let mut reader = Reader::with_config(buffer, config);
    let outcome = body(&mut reader);
    let finished = reader.finish();
    match (outcome, finished) {
        (Ok(value), Ok(tail)) => {
            if !tail.is_empty() {
                tracing::trace!(trailing = tail.len(), "read session left trailing bytes");
            }
            Ok(value)
        }
        (Ok(_), Err(err)) => {
            tracing::warn!(%err, "read session failed to finalize");
            Err(err)
        }
        (Err(err), finished) => {
            if let Err(finalize) = finished {
                tracing::debug!(%err, %finalize, "read session finalize failed after decode error");
            }
            Err(err)
        }
    }
}

/// Serializes `value` into `buffer` and returns the number of bytes written.
///
/// # Errors
/// Fails with [`StreamError::BufferFull`] when the encoding does not fit `buffer`.
///
/// # Example
/// ```rust
/// use recpack::{from_msgpack, to_msgpack, Record};
///
/// #[derive(Record, Default, PartialEq, Debug)]
/// struct Sample {
///     name: String,
///     value: f64,
/// }
///
/// let sample = Sample { name: "temp".to_string(), value: 21.5 };
/// let mut buffer = [0u8; 64];
/// let len = to_msgpack(&mut buffer, &sample).unwrap();
///
/// let mut decoded = Sample::default();
/// from_msgpack(&buffer[..len], &mut decoded).unwrap();
/// assert_eq!(decoded, sample);
/// ```
pub fn to_msgpack(buffer: &mut [u8], value: &dyn Serializable) -> Result<usize> {
    write_session(buffer, |writer| value.serialize(writer))
}

/// Deserializes `buffer` into `value` using the default [`ReaderConfig`].
///
/// On error `value` may be partially populated.
pub fn from_msgpack(buffer: &[u8], value: &mut dyn Serializable) -> Result<()> {
    from_msgpack_with(buffer, value, ReaderConfig::default())
}

/// Like [`from_msgpack`] with explicit reader limits.
pub fn from_msgpack_with(
    buffer: &[u8],
    value: &mut dyn Serializable,
    config: ReaderConfig,
) -> Result<()> {
    read_session(buffer, config, |reader| value.deserialize(reader))
}
