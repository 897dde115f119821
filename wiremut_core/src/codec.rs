//! Length-prefix wire codec.
//!
//! Wire format:
//! ```text
//! ┌─────────────┬──────────────────────┐
//! │ Length (4B) │ Payload (Length B)   │
//! │ BE u32      │                      │
//! └─────────────┴──────────────────────┘
//! ```
//!
//! None of these functions validate their input. Run a buffer through
//! [`crate::validator::validate`] first; on unvalidated input the codec stays
//! in bounds but clamps to whatever bytes are actually available.

/// Size of the big-endian length prefix.
pub const HEADER_SIZE: usize = 4;

/// Interprets a 4-byte header as a big-endian payload size.
pub fn decode_size(header: [u8; HEADER_SIZE]) -> u32 {
    u32::from_be_bytes(header)
}

/// Inverse of [`decode_size`].
pub fn encode_size(size: u32) -> [u8; HEADER_SIZE] {
    size.to_be_bytes()
}

/// Reads the declared payload size from the front of a wire buffer.
///
/// Returns `None` if the buffer cannot hold a full header.
pub fn read_size(wire: &[u8]) -> Option<u32> {
    wire.first_chunk::<HEADER_SIZE>()
        .map(|header| decode_size(*header))
}

/// Writes `[BE-u32 length][payload]` into `out`, replacing its contents.
///
/// `payload.len()` must fit the prefix; callers only pass payloads taken
/// from validated buffers. Returns the encoded size.
pub fn encode(payload: &[u8], out: &mut Vec<u8>) -> usize {
    debug_assert!(payload.len() <= u32::MAX as usize);
    out.clear();
    out.reserve(HEADER_SIZE + payload.len());
    out.extend_from_slice(&encode_size(payload.len() as u32));
    out.extend_from_slice(payload);
    out.len()
}

/// Encodes a payload that already lives at the start of `buf`.
///
/// `buf[..payload_len]` holds the payload on entry and `buf[..payload_len + 4]`
/// holds the wire encoding on return. The payload is shifted right by
/// [`HEADER_SIZE`] bytes before the prefix is written, so no unread payload
/// byte is overwritten. `buf` must be at least `payload_len + 4` bytes long.
pub fn encode_in_place(buf: &mut [u8], payload_len: usize) -> usize {
    debug_assert!(buf.len() >= payload_len + HEADER_SIZE);
    buf.copy_within(..payload_len, HEADER_SIZE);
    buf[..HEADER_SIZE].copy_from_slice(&encode_size(payload_len as u32));
    payload_len + HEADER_SIZE
}

/// Returns the payload of a wire buffer without copying it.
pub fn payload(wire: &[u8]) -> &[u8] {
    let Some(declared) = read_size(wire) else {
        return &[];
    };
    let body = &wire[HEADER_SIZE..];
    &body[..body.len().min(declared as usize)]
}

/// Copies the payload of `wire` into the front of `out`.
///
/// Returns the number of payload bytes written. For validated input this is
/// the declared size, provided `out` is large enough to hold it.
pub fn decode(wire: &[u8], out: &mut [u8]) -> usize {
    let body = payload(wire);
    let len = body.len().min(out.len());
    out[..len].copy_from_slice(&body[..len]);
    len
}
