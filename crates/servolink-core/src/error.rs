//! Engine error types.

use thiserror::Error;

/// Errors from the write-side framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramerError {
    /// A frame write is already in flight; only one may run at a time.
    #[error("a frame write is already in flight")]
    Busy,

    /// Payload exceeds the 127-byte frame limit.
    #[error("payload of {size} bytes exceeds the frame limit")]
    PayloadTooLarge {
        /// Offending payload size.
        size: usize,
    },
}

/// Errors from the read-side deframer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeframerError {
    /// A frame read is already in flight; only one may run at a time.
    #[error("a frame read is already in flight")]
    Busy,
}

/// Synchronous rejections from the endpoint multiplexer.
///
/// These surface from `start_endpoint_operation` before any bytes reach the
/// wire; the operation never existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MuxError {
    /// Request payload plus packet overhead exceeds the transmit MTU.
    #[error("request payload of {size} bytes exceeds the transmit mtu of {mtu}")]
    RequestTooLarge {
        /// Offending payload size.
        size: usize,
        /// Configured transmit MTU.
        mtu: usize,
    },

    /// The transmit slot and the single queue slot are both occupied. The
    /// protocol does not queue unboundedly.
    #[error("transmit and queue slots are both occupied")]
    Backlogged,

    /// The freshly allocated sequence number is still attached to a live
    /// operation (15-bit wraparound on a very busy link).
    #[error("sequence number {seq_no:#06x} is still awaiting a reply")]
    SequenceInUse {
        /// The colliding wire sequence number.
        seq_no: u16,
    },
}
