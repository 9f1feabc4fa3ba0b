//! Synthetic payload content.
//!
//! ```text
//! [0..16)        "AAAA        AAAA"
//! [16..len-16)   byte i = i mod 256
//! [len-16..len)  "ZZZZ        ZZZZ"
//! ```
//!
//! Payloads shorter than two markers carry only the counter pattern.

use bytes::{Bytes, BytesMut};

/// Marker length in bytes.
pub const MARKER_BYTES: usize = 16;

/// Leading sentinel.
pub const START_MARKER: &[u8; MARKER_BYTES] = b"AAAA        AAAA";

/// Trailing sentinel.
pub const END_MARKER: &[u8; MARKER_BYTES] = b"ZZZZ        ZZZZ";

/// Build the payload shared by every frame of a run.
pub fn build_payload(len: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(len);
    buf.extend((0..len).map(|i| (i % 256) as u8));

    if len >= 2 * MARKER_BYTES {
        buf[..MARKER_BYTES].copy_from_slice(START_MARKER);
        buf[len - MARKER_BYTES..].copy_from_slice(END_MARKER);
    }
    buf.freeze()
}
