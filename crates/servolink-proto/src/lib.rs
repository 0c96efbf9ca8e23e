//! Wire format for the servolink device protocol.
//!
//! Pure data layer shared by the host and device sides of the link:
//!
//! - [`frame`]: length-prefixed, CRC-protected framing for byte streams
//! - [`packet`]: the endpoint request/reply packet carried inside frames
//! - [`crc`]: the canonical CRC-8/CRC-16 configuration both peers share
//!
//! No I/O and no protocol state lives here; the state machines that drive
//! these layouts over real transports are in `servolink-core`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod crc;
mod errors;
pub mod frame;
pub mod packet;

pub use errors::{ProtocolError, Result};
pub use frame::{HeaderVerdict, FRAME_PREFIX, HEADER_SIZE, MAX_FRAME_PAYLOAD, TRAILER_SIZE};
pub use packet::{
    Packet, Reply, Request, RequestHeader, ENDPOINT_MASK, EXPECT_RESPONSE_BIT, PROTOCOL_VERSION,
    REQUEST_OVERHEAD, SEQ_MARKER_BIT, SEQ_MASK, SEQ_REPLY_BIT,
};
