//! Byte-stream frame layout.
//!
//! A frame wraps one packet for transport over an unreliable byte stream:
//!
//! ```text
//! +------+-----+-------+=========+------------------+
//! | 0xAA | LEN | CRC8H | payload | CRC16 (big end.) |
//! +------+-----+-------+=========+------------------+
//!   1      1     1       LEN       2
//! ```
//!
//! `LEN` is at most 127; its high bit is reserved and must be zero. `CRC8H`
//! covers the two preceding header bytes, so a receiver validates the header
//! by checking that the CRC-8 over all three bytes is zero. The CRC-16 covers
//! the payload and is transmitted most significant byte first, giving the
//! same residual-zero check over payload plus trailer.

use crate::{
    crc::{crc16, crc8, CRC16_INIT, CRC8_INIT},
    errors::{ProtocolError, Result},
};

/// First byte of every frame.
pub const FRAME_PREFIX: u8 = 0xAA;

/// Largest payload one frame can carry. The length byte's high bit is
/// reserved for a future extension.
pub const MAX_FRAME_PAYLOAD: usize = 127;

/// Size of the frame header (prefix, length, CRC-8).
pub const HEADER_SIZE: usize = 3;

/// Size of the frame trailer (CRC-16, big endian).
pub const TRAILER_SIZE: usize = 2;

/// Header bytes for a payload of `len` bytes.
///
/// `len` must already be validated against [`MAX_FRAME_PAYLOAD`].
#[must_use]
pub fn header(len: u8) -> [u8; HEADER_SIZE] {
    let mut hdr = [FRAME_PREFIX, len, 0];
    hdr[2] = crc8(CRC8_INIT, &hdr[..2]);
    hdr
}

/// Trailer bytes (big-endian CRC-16) for `payload`.
#[must_use]
pub fn trailer(payload: &[u8]) -> [u8; TRAILER_SIZE] {
    crc16(CRC16_INIT, payload).to_be_bytes()
}

/// True if the CRC-16 residual over `payload` plus `trailer` is zero.
#[must_use]
pub fn payload_crc_ok(payload: &[u8], trailer: &[u8; TRAILER_SIZE]) -> bool {
    crc16(crc16(CRC16_INIT, payload), trailer) == 0
}

/// Encode `payload` as one complete frame.
///
/// # Errors
///
/// `ProtocolError::PayloadTooLarge` if `payload` exceeds
/// [`MAX_FRAME_PAYLOAD`].
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    frame.extend_from_slice(&header(payload.len() as u8));
    frame.extend_from_slice(payload);
    frame.extend_from_slice(&trailer(payload));
    Ok(frame)
}

/// Decode exactly one frame, returning its payload.
///
/// Strict variant for packet-oriented transports where one transport packet
/// carries one frame: no resynchronisation, no tolerance for extra bytes.
/// The streaming deframer in the core crate handles the unreliable
/// byte-stream case.
///
/// # Errors
///
/// Any [`ProtocolError`] describing the first malformed part of the buffer.
pub fn decode(bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < HEADER_SIZE + TRAILER_SIZE {
        return Err(ProtocolError::TooShort {
            expected: HEADER_SIZE + TRAILER_SIZE,
            actual: bytes.len(),
        });
    }

    match inspect_header([bytes[0], bytes[1], bytes[2]]) {
        HeaderVerdict::Discard(1) => return Err(ProtocolError::BadPrefix(bytes[0])),
        HeaderVerdict::Discard(2) => return Err(ProtocolError::ReservedLengthBit(bytes[1])),
        HeaderVerdict::Discard(_) => return Err(ProtocolError::HeaderCrc),
        HeaderVerdict::Accept { payload_len } => {
            let len = usize::from(payload_len);
            let total = HEADER_SIZE + len + TRAILER_SIZE;
            if bytes.len() < total {
                return Err(ProtocolError::TooShort { expected: total, actual: bytes.len() });
            }
            if bytes.len() > total {
                return Err(ProtocolError::TrailingBytes(bytes.len() - total));
            }

            let payload = &bytes[HEADER_SIZE..HEADER_SIZE + len];
            let trailer = [bytes[total - 2], bytes[total - 1]];
            if !payload_crc_ok(payload, &trailer) {
                return Err(ProtocolError::PayloadCrc);
            }
            Ok(payload)
        },
    }
}

/// Outcome of inspecting three accumulated header bytes.
///
/// Drives the deframer's resynchronisation: every malformed header discards
/// at least one byte, so scanning makes forward progress on arbitrary
/// garbage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderVerdict {
    /// Header is valid; a payload of this many bytes follows.
    Accept {
        /// Value of the length byte.
        payload_len: u8,
    },

    /// Header is invalid; drop this many leading bytes and rescan.
    Discard(usize),
}

/// Classify three header bytes per the resynchronisation policy.
#[must_use]
pub fn inspect_header(bytes: [u8; HEADER_SIZE]) -> HeaderVerdict {
    if bytes[0] != FRAME_PREFIX {
        HeaderVerdict::Discard(1)
    } else if bytes[1] & 0x80 != 0 {
        HeaderVerdict::Discard(2)
    } else if crc8(CRC8_INIT, &bytes) != 0 {
        HeaderVerdict::Discard(3)
    } else {
        HeaderVerdict::Accept { payload_len: bytes[1] }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_produces_documented_layout() {
        let payload = [0x01, 0x02, 0x03];
        let frame = encode(&payload).unwrap();

        assert_eq!(frame[0], FRAME_PREFIX);
        assert_eq!(frame[1], 3);
        assert_eq!(frame[2], crc8(CRC8_INIT, &frame[..2]));
        assert_eq!(&frame[3..6], &payload);
        assert_eq!(&frame[6..], &crc16(CRC16_INIT, &payload).to_be_bytes());
    }

    #[test]
    fn empty_payload_round_trips() {
        let frame = encode(&[]).unwrap();
        assert_eq!(frame.len(), HEADER_SIZE + TRAILER_SIZE);
        assert_eq!(decode(&frame).unwrap(), &[] as &[u8]);
    }

    #[test]
    fn max_payload_round_trips() {
        let payload = vec![0x5A; MAX_FRAME_PAYLOAD];
        let frame = encode(&payload).unwrap();
        assert_eq!(decode(&frame).unwrap(), &payload[..]);
    }

    #[test]
    fn oversized_payload_rejected() {
        let payload = vec![0; MAX_FRAME_PAYLOAD + 1];
        assert_eq!(
            encode(&payload),
            Err(ProtocolError::PayloadTooLarge { size: 128, max: 127 })
        );
    }

    #[test]
    fn bad_prefix_discards_one() {
        assert_eq!(inspect_header([0x00, 0x05, 0x00]), HeaderVerdict::Discard(1));
    }

    #[test]
    fn reserved_length_bit_discards_two() {
        assert_eq!(inspect_header([FRAME_PREFIX, 0x80, 0x00]), HeaderVerdict::Discard(2));
    }

    #[test]
    fn bad_header_crc_discards_three() {
        let mut hdr = header(5);
        hdr[2] ^= 0xFF;
        assert_eq!(inspect_header(hdr), HeaderVerdict::Discard(3));
    }

    #[test]
    fn valid_header_accepted() {
        assert_eq!(inspect_header(header(5)), HeaderVerdict::Accept { payload_len: 5 });
    }

    #[test]
    fn corrupted_payload_rejected() {
        let mut frame = encode(b"hello").unwrap();
        frame[4] ^= 0x01;
        assert_eq!(decode(&frame), Err(ProtocolError::PayloadCrc));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut frame = encode(b"hello").unwrap();
        frame.push(0x00);
        assert_eq!(decode(&frame), Err(ProtocolError::TrailingBytes(1)));
    }
}
