//! Endpoint packet layout.
//!
//! An endpoint packet is the unit the request/reply multiplexer exchanges.
//! It travels inside a frame on byte-stream transports, or as one transport
//! packet on packet-oriented ones. All fields are little endian:
//!
//! ```text
//! offset  size  field
//! 0       2     seq_no       (bit 15: 0 = request, 1 = reply)
//! 2       2     endpoint_id  (bit 15 on a request = expect a response)
//! 4       2     rx_length    (desired reply byte count)
//! 6       N     opaque payload
//! 6+N     2     trailer      (endpoint 0: protocol version; else descriptor CRC)
//! ```
//!
//! Replies omit everything but the sequence number: `seq_no | 0x8000`
//! followed by up to `rx_length` payload bytes.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Protocol version quoted as the trailer of endpoint-0 requests.
pub const PROTOCOL_VERSION: u16 = 1;

/// Set on `seq_no` to mark a packet as a reply.
pub const SEQ_REPLY_BIT: u16 = 0x8000;

/// Always set on wire sequence numbers. Keeps binary packets visibly
/// distinct from the ASCII alternate protocol that may share the link.
pub const SEQ_MARKER_BIT: u16 = 0x0080;

/// Mask extracting the 15-bit sequence number.
pub const SEQ_MASK: u16 = 0x7FFF;

/// Set on `endpoint_id` when the request expects a response.
pub const EXPECT_RESPONSE_BIT: u16 = 0x8000;

/// Mask extracting the 15-bit endpoint id.
pub const ENDPOINT_MASK: u16 = 0x7FFF;

/// Fixed-field bytes a request adds around its payload (header + trailer).
pub const REQUEST_OVERHEAD: usize = RequestHeader::SIZE + 2;

/// Fixed six-byte request header (little endian).
///
/// Stored as raw byte pairs so the struct can be cast directly from
/// untrusted packet bytes without alignment concerns.
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct RequestHeader {
    seq_no: [u8; 2],
    endpoint_id: [u8; 2],
    rx_length: [u8; 2],
}

impl RequestHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 6;

    /// Build a header from field values.
    #[must_use]
    pub fn new(seq_no: u16, endpoint_id: u16, expect_response: bool, rx_length: u16) -> Self {
        let endpoint = if expect_response { endpoint_id | EXPECT_RESPONSE_BIT } else { endpoint_id };
        Self {
            seq_no: seq_no.to_le_bytes(),
            endpoint_id: endpoint.to_le_bytes(),
            rx_length: rx_length.to_le_bytes(),
        }
    }

    /// Parse a header from the start of `bytes` (zero-copy).
    ///
    /// # Errors
    ///
    /// `ProtocolError::TooShort` if fewer than [`Self::SIZE`] bytes remain.
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        Self::ref_from_prefix(bytes)
            .map(|(header, _)| header)
            .map_err(|_| ProtocolError::TooShort { expected: Self::SIZE, actual: bytes.len() })
    }

    /// Raw sequence number, marker bit included.
    #[must_use]
    pub fn seq_no(&self) -> u16 {
        u16::from_le_bytes(self.seq_no)
    }

    /// Endpoint id with the expect-response bit stripped.
    #[must_use]
    pub fn endpoint_id(&self) -> u16 {
        u16::from_le_bytes(self.endpoint_id) & ENDPOINT_MASK
    }

    /// True if the sender wants a reply.
    #[must_use]
    pub fn expect_response(&self) -> bool {
        u16::from_le_bytes(self.endpoint_id) & EXPECT_RESPONSE_BIT != 0
    }

    /// Number of reply bytes the sender asked for.
    #[must_use]
    pub fn rx_length(&self) -> u16 {
        u16::from_le_bytes(self.rx_length)
    }
}

impl std::fmt::Debug for RequestHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHeader")
            .field("seq_no", &format!("{:#06x}", self.seq_no()))
            .field("endpoint_id", &self.endpoint_id())
            .field("expect_response", &self.expect_response())
            .field("rx_length", &self.rx_length())
            .finish()
    }
}

/// Borrowed view of a request packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    /// Wire sequence number (marker bit included, reply bit clear).
    pub seq_no: u16,
    /// Target endpoint (15-bit).
    pub endpoint_id: u16,
    /// True if the sender wants a reply.
    pub expect_response: bool,
    /// Desired reply byte count.
    pub rx_length: u16,
    /// Opaque payload handed to the endpoint handler.
    pub payload: &'a [u8],
    /// Trailer value the receiver validates against its own expectation.
    pub trailer: u16,
}

impl<'a> Request<'a> {
    /// Parse a request from a whole packet.
    ///
    /// # Errors
    ///
    /// `ProtocolError::TooShort` if the packet cannot hold the fixed header
    /// and trailer.
    pub fn parse(packet: &'a [u8]) -> Result<Self> {
        if packet.len() < REQUEST_OVERHEAD {
            return Err(ProtocolError::TooShort {
                expected: REQUEST_OVERHEAD,
                actual: packet.len(),
            });
        }

        let header = RequestHeader::from_bytes(packet)?;
        let trailer_at = packet.len() - 2;
        let trailer = u16::from_le_bytes([packet[trailer_at], packet[trailer_at + 1]]);

        Ok(Self {
            seq_no: header.seq_no(),
            endpoint_id: header.endpoint_id(),
            expect_response: header.expect_response(),
            rx_length: header.rx_length(),
            payload: &packet[RequestHeader::SIZE..trailer_at],
            trailer,
        })
    }

    /// Encode this request as a packet.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let header =
            RequestHeader::new(self.seq_no, self.endpoint_id, self.expect_response, self.rx_length);

        let mut packet = Vec::with_capacity(REQUEST_OVERHEAD + self.payload.len());
        packet.extend_from_slice(header.as_bytes());
        packet.extend_from_slice(self.payload);
        packet.extend_from_slice(&self.trailer.to_le_bytes());
        packet
    }
}

/// Borrowed view of a reply packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply<'a> {
    /// Sequence number of the request being answered (reply bit stripped).
    pub seq_no: u16,
    /// Reply payload.
    pub payload: &'a [u8],
}

impl<'a> Reply<'a> {
    /// Encode a reply packet answering `seq_no`.
    #[must_use]
    pub fn encode(seq_no: u16, payload: &[u8]) -> Vec<u8> {
        let mut packet = Vec::with_capacity(2 + payload.len());
        packet.extend_from_slice(&(seq_no | SEQ_REPLY_BIT).to_le_bytes());
        packet.extend_from_slice(payload);
        packet
    }
}

/// A parsed endpoint packet, classified by the reply bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet<'a> {
    /// Inbound request for the server half.
    Request(Request<'a>),
    /// Inbound reply for the client half.
    Reply(Reply<'a>),
}

impl<'a> Packet<'a> {
    /// Classify and parse a whole packet.
    ///
    /// # Errors
    ///
    /// `ProtocolError::TooShort` if the packet cannot hold its fixed fields.
    pub fn parse(packet: &'a [u8]) -> Result<Self> {
        if packet.len() < 2 {
            return Err(ProtocolError::TooShort { expected: 2, actual: packet.len() });
        }

        let seq_no = u16::from_le_bytes([packet[0], packet[1]]);
        if seq_no & SEQ_REPLY_BIT != 0 {
            Ok(Self::Reply(Reply { seq_no: seq_no & SEQ_MASK, payload: &packet[2..] }))
        } else {
            Request::parse(packet).map(Self::Request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips() {
        let request = Request {
            seq_no: 0x0081,
            endpoint_id: 5,
            expect_response: true,
            rx_length: 32,
            payload: &[0xDE, 0xAD, 0xBE, 0xEF],
            trailer: 0x1234,
        };

        let packet = request.encode();
        assert_eq!(packet.len(), REQUEST_OVERHEAD + 4);

        match Packet::parse(&packet).unwrap() {
            Packet::Request(parsed) => assert_eq!(parsed, request),
            Packet::Reply(_) => unreachable!("reply bit is clear"),
        }
    }

    #[test]
    fn reply_round_trips() {
        let packet = Reply::encode(0x0081, &[1, 2, 3]);

        match Packet::parse(&packet).unwrap() {
            Packet::Reply(reply) => {
                assert_eq!(reply.seq_no, 0x0081);
                assert_eq!(reply.payload, &[1, 2, 3]);
            },
            Packet::Request(_) => unreachable!("reply bit is set"),
        }
    }

    #[test]
    fn empty_reply_parses() {
        let packet = Reply::encode(0x0100, &[]);
        match Packet::parse(&packet).unwrap() {
            Packet::Reply(reply) => assert!(reply.payload.is_empty()),
            Packet::Request(_) => unreachable!(),
        }
    }

    #[test]
    fn runt_packet_rejected() {
        assert_eq!(
            Packet::parse(&[0x81]),
            Err(ProtocolError::TooShort { expected: 2, actual: 1 })
        );
    }

    #[test]
    fn headerless_request_rejected() {
        // Request bit clear but too short for header + trailer.
        let packet = [0x81, 0x00, 0x01, 0x00, 0x04, 0x00];
        assert_eq!(
            Packet::parse(&packet),
            Err(ProtocolError::TooShort { expected: REQUEST_OVERHEAD, actual: 6 })
        );
    }

    #[test]
    fn expect_response_bit_is_isolated() {
        let header = RequestHeader::new(0x0081, 0x0005, true, 16);
        assert_eq!(header.endpoint_id(), 0x0005);
        assert!(header.expect_response());

        let header = RequestHeader::new(0x0081, 0x0005, false, 16);
        assert!(!header.expect_response());
    }
}
