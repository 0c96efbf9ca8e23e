//! Wire-format error types.

use thiserror::Error;

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire data.
///
/// The streaming deframer never surfaces these; it resynchronises instead.
/// They are returned by the strict whole-buffer codecs used on
/// packet-oriented transports and in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Payload exceeds the 127-byte frame limit.
    #[error("payload too large: {size} bytes exceeds {max}")]
    PayloadTooLarge {
        /// Offending payload size.
        size: usize,
        /// Largest size a frame can carry.
        max: usize,
    },

    /// Buffer ends before the structure it should contain.
    #[error("buffer too short: {actual} bytes, need at least {expected}")]
    TooShort {
        /// Minimum byte count required.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// First frame byte is not the canonical prefix.
    #[error("bad frame prefix {0:#04x}")]
    BadPrefix(u8),

    /// Length byte has the reserved high bit set.
    #[error("reserved length bit set: {0:#04x}")]
    ReservedLengthBit(u8),

    /// Header CRC-8 residual was non-zero.
    #[error("header checksum mismatch")]
    HeaderCrc,

    /// Payload/trailer CRC-16 residual was non-zero.
    #[error("payload checksum mismatch")]
    PayloadCrc,

    /// Frame carries bytes beyond the encoded structure.
    #[error("trailing garbage: {0} bytes past the end of the frame")]
    TrailingBytes(usize),
}
