use crate::codec::{self, HEADER_SIZE};
use crate::diagnostics::DiagnosticSink;
use log::Level;
use thiserror::Error;

/// Largest wire buffer accepted. Keeps `declared + HEADER_SIZE` clear of
/// `u32` overflow when a mutated payload is re-encoded.
pub const MAX_WIRE_SIZE: usize = 0xFFFF_FF00;

/// Reasons a buffer fails wire validation, in the order they are checked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// The buffer cannot hold the 4-byte size prefix.
    #[error("Buffer size out of range: {actual} bytes is smaller than the size prefix")]
    TooShort { actual: usize },

    /// The buffer is larger than [`MAX_WIRE_SIZE`].
    #[error("Buffer size out of range: {actual} bytes exceeds the maximum of {max}")]
    TooLarge { actual: usize, max: usize },

    /// The prefix disagrees with the number of payload bytes present.
    #[error("Buffer size doesn't match encoded size: expected {expected} but got {actual}")]
    SizeMismatch {
        declared: u32,
        expected: u64,
        actual: usize,
    },
}

/// Checks a wire buffer and returns its declared payload size.
pub fn validate(buf: &[u8]) -> Result<u32, WireError> {
    let actual = buf.len();
    if actual < HEADER_SIZE {
        return Err(WireError::TooShort { actual });
    }
    if actual > MAX_WIRE_SIZE {
        return Err(WireError::TooLarge {
            actual,
            max: MAX_WIRE_SIZE,
        });
    }

    let declared = codec::read_size(buf).ok_or(WireError::TooShort { actual })?;
    let expected = u64::from(declared) + HEADER_SIZE as u64;
    if expected != actual as u64 {
        return Err(WireError::SizeMismatch {
            declared,
            expected,
            actual,
        });
    }
    Ok(declared)
}

pub fn is_valid(buf: &[u8]) -> bool {
    validate(buf).is_ok()
}

/// Same as [`validate`], reporting failures to `sink`.
///
/// On a size mismatch the sink also receives a dump of the bytes the prefix
/// claims, clamped to what the buffer actually holds.
pub fn validate_with(buf: &[u8], sink: &mut DiagnosticSink) -> Result<u32, WireError> {
    let result = validate(buf);
    if let Err(err) = &result {
        sink.emit(Level::Warn, format_args!("[mutator] {err}"));
        if let WireError::SizeMismatch { expected, .. } = err {
            sink.emit(
                Level::Debug,
                format_args!("[mutator] According to the encoding, the buffer looks like:"),
            );
            let claimed = usize::try_from(*expected).unwrap_or(usize::MAX);
            sink.dump(Level::Debug, &buf[..claimed.min(buf.len())]);
        }
    }
    result
}
