//! Read-side framing state machine.
//!
//! Scans an unreliable byte stream for valid frames:
//!
//! `Idle → ReceivingHeader → ReceivingPayload → ReceivingTrailer → Idle`
//!
//! The deframer owns its 3-byte header and 2-byte trailer buffers; the
//! caller only chooses how much payload it can accept. Malformed headers are
//! never surfaced: the resynchronisation policy discards between one and
//! three leading bytes and rescans, so every junk byte is consumed in
//! bounded time. Payload checksum failures silently restart the header scan.

use bytes::Bytes;
use servolink_proto::{
    frame::{self, HeaderVerdict},
    HEADER_SIZE, TRAILER_SIZE,
};
use tracing::debug;

use crate::{
    error::DeframerError,
    transfer::TransferError,
};

/// Read-side state. Each variant carries exactly the data valid in it.
enum ReadState {
    /// No read in flight.
    Idle,

    /// Accumulating the 3-byte header.
    Header {
        buf: [u8; HEADER_SIZE],
        have: usize,
        capacity: usize,
    },

    /// Header accepted; accumulating `want` payload bytes.
    Payload {
        buf: Vec<u8>,
        want: usize,
        capacity: usize,
    },

    /// Accumulating the 2-byte trailer.
    Trailer {
        payload: Vec<u8>,
        buf: [u8; TRAILER_SIZE],
        have: usize,
        capacity: usize,
    },

    /// Cancelled; the next completion collapses back to idle.
    Cancelling,
}

/// What to do after a read completion.
#[derive(Debug, PartialEq, Eq)]
pub enum DeframerStep {
    /// Read up to this many bytes from the receive channel.
    Read(usize),

    /// The read finished: a validated frame payload, or a terminal error
    /// from the channel.
    Done(Result<Bytes, TransferError>),
}

/// Read-side deframer.
pub struct Deframer {
    state: ReadState,
}

impl Deframer {
    /// New idle deframer.
    #[must_use]
    pub fn new() -> Self {
        Self { state: ReadState::Idle }
    }

    /// True if no read is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, ReadState::Idle)
    }

    /// Begin scanning for the next frame, accepting at most `capacity`
    /// payload bytes. Returns how many bytes to read first.
    ///
    /// A frame longer than `capacity` is truncated: the excess stays in the
    /// stream and is consumed by the following resynchronisation.
    ///
    /// # Errors
    ///
    /// `DeframerError::Busy` if a read is already in flight.
    pub fn start_read(&mut self, capacity: usize) -> Result<usize, DeframerError> {
        if !self.is_idle() {
            return Err(DeframerError::Busy);
        }
        self.state = ReadState::Header { buf: [0; HEADER_SIZE], have: 0, capacity };
        Ok(HEADER_SIZE)
    }

    /// Cancel the in-flight read. Idempotent; a no-op when idle.
    pub fn cancel(&mut self) {
        if !matches!(self.state, ReadState::Idle | ReadState::Cancelling) {
            self.state = ReadState::Cancelling;
        }
    }

    /// Feed a completion from the receive channel. `data` holds the bytes
    /// actually read; short reads are fine.
    ///
    /// Returns `None` if no read was in flight (spurious completion).
    pub fn on_read_done(&mut self, data: Result<&[u8], TransferError>) -> Option<DeframerStep> {
        let state = std::mem::replace(&mut self.state, ReadState::Idle);

        let bytes = match (state, data) {
            (ReadState::Idle, _) => return None,
            (ReadState::Cancelling, _) => {
                return Some(DeframerStep::Done(Err(TransferError::Cancelled)));
            },
            (_, Err(err)) => return Some(DeframerStep::Done(Err(err))),
            (state, Ok(bytes)) => {
                // Put the state back and process below.
                self.state = state;
                bytes
            },
        };

        match std::mem::replace(&mut self.state, ReadState::Idle) {
            ReadState::Header { mut buf, mut have, capacity } => {
                let n = bytes.len().min(HEADER_SIZE - have);
                buf[have..have + n].copy_from_slice(&bytes[..n]);
                have += n;

                if have < HEADER_SIZE {
                    self.state = ReadState::Header { buf, have, capacity };
                    return Some(DeframerStep::Read(HEADER_SIZE - have));
                }
                Some(self.process_header(buf, capacity))
            },

            ReadState::Payload { mut buf, want, capacity } => {
                let n = bytes.len().min(want - buf.len());
                buf.extend_from_slice(&bytes[..n]);

                if buf.len() < want {
                    let missing = want - buf.len();
                    self.state = ReadState::Payload { buf, want, capacity };
                    return Some(DeframerStep::Read(missing));
                }

                self.state =
                    ReadState::Trailer { payload: buf, buf: [0; TRAILER_SIZE], have: 0, capacity };
                Some(DeframerStep::Read(TRAILER_SIZE))
            },

            ReadState::Trailer { payload, mut buf, mut have, capacity } => {
                let n = bytes.len().min(TRAILER_SIZE - have);
                buf[have..have + n].copy_from_slice(&bytes[..n]);
                have += n;

                if have < TRAILER_SIZE {
                    self.state = ReadState::Trailer { payload, buf, have, capacity };
                    return Some(DeframerStep::Read(TRAILER_SIZE - have));
                }

                if frame::payload_crc_ok(&payload, &buf) {
                    Some(DeframerStep::Done(Ok(Bytes::from(payload))))
                } else {
                    // Bad payload checksum: keep scanning, never surface.
                    debug!("frame checksum mismatch, resynchronising");
                    self.state =
                        ReadState::Header { buf: [0; HEADER_SIZE], have: 0, capacity };
                    Some(DeframerStep::Read(HEADER_SIZE))
                }
            },

            // Both handled in the first match.
            ReadState::Idle | ReadState::Cancelling => None,
        }
    }

    /// Apply the resynchronisation policy to a filled header buffer.
    fn process_header(&mut self, mut buf: [u8; HEADER_SIZE], capacity: usize) -> DeframerStep {
        match frame::inspect_header(buf) {
            HeaderVerdict::Accept { payload_len } => {
                let want = capacity.min(usize::from(payload_len));
                if want == 0 {
                    self.state = ReadState::Trailer {
                        payload: Vec::new(),
                        buf: [0; TRAILER_SIZE],
                        have: 0,
                        capacity,
                    };
                    DeframerStep::Read(TRAILER_SIZE)
                } else {
                    self.state =
                        ReadState::Payload { buf: Vec::with_capacity(want), want, capacity };
                    DeframerStep::Read(want)
                }
            },

            HeaderVerdict::Discard(n) => {
                // Shift the surviving bytes down and refill.
                buf.copy_within(n..HEADER_SIZE, 0);
                self.state = ReadState::Header { buf, have: HEADER_SIZE - n, capacity };
                DeframerStep::Read(n)
            },
        }
    }
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed `wire` to the deframer in `chunk`-sized slices until it
    /// completes, returning the payload.
    fn run(deframer: &mut Deframer, capacity: usize, wire: &[u8], chunk: usize) -> Bytes {
        let mut want = deframer.start_read(capacity).unwrap();
        let mut pos = 0;

        loop {
            let n = want.min(chunk).min(wire.len() - pos);
            let slice = &wire[pos..pos + n];
            pos += n;

            match deframer.on_read_done(Ok(slice)).unwrap() {
                DeframerStep::Read(next) => want = next,
                DeframerStep::Done(result) => return result.unwrap(),
            }
        }
    }

    #[test]
    fn clean_frame_round_trips() {
        let wire = servolink_proto::frame::encode(b"payload").unwrap();
        let mut deframer = Deframer::new();
        assert_eq!(run(&mut deframer, 127, &wire, usize::MAX), &b"payload"[..]);
        assert!(deframer.is_idle());
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let wire = servolink_proto::frame::encode(b"drip fed").unwrap();
        let mut deframer = Deframer::new();
        assert_eq!(run(&mut deframer, 127, &wire, 1), &b"drip fed"[..]);
    }

    #[test]
    fn empty_frame_round_trips() {
        let wire = servolink_proto::frame::encode(&[]).unwrap();
        let mut deframer = Deframer::new();
        assert_eq!(run(&mut deframer, 127, &wire, usize::MAX), Bytes::new());
    }

    #[test]
    fn leading_garbage_byte_is_skipped() {
        // 00 AA 05 <crc8> <5 bytes> <crc16>: one junk byte, then a valid
        // frame. The deframer discards the 0x00 and recovers the payload.
        let mut wire = vec![0x00];
        wire.extend_from_slice(&servolink_proto::frame::encode(&[1, 2, 3, 4, 5]).unwrap());

        let mut deframer = Deframer::new();
        assert_eq!(run(&mut deframer, 127, &wire, usize::MAX), &[1, 2, 3, 4, 5][..]);
    }

    #[test]
    fn reserved_length_bit_discards_two() {
        let mut wire = vec![0xAA, 0x85, 0x00];
        wire.extend_from_slice(&servolink_proto::frame::encode(b"ok").unwrap());

        let mut deframer = Deframer::new();
        assert_eq!(run(&mut deframer, 127, &wire, usize::MAX), &b"ok"[..]);
    }

    #[test]
    fn corrupt_payload_resyncs_to_next_frame() {
        let mut bad = servolink_proto::frame::encode(b"doomed").unwrap();
        let tampered = bad.len() - 3;
        bad[tampered] ^= 0xFF;
        bad.extend_from_slice(&servolink_proto::frame::encode(b"good").unwrap());

        let mut deframer = Deframer::new();
        assert_eq!(run(&mut deframer, 127, &bad, usize::MAX), &b"good"[..]);
    }

    #[test]
    fn second_read_while_busy_fails() {
        let mut deframer = Deframer::new();
        deframer.start_read(127).unwrap();
        assert_eq!(deframer.start_read(127), Err(DeframerError::Busy));
    }

    #[test]
    fn transport_error_propagates_and_resets() {
        let mut deframer = Deframer::new();
        deframer.start_read(127).unwrap();

        let step = deframer.on_read_done(Err(TransferError::Closed)).unwrap();
        assert_eq!(step, DeframerStep::Done(Err(TransferError::Closed)));
        assert!(deframer.is_idle());
    }

    #[test]
    fn cancel_reports_cancelled_on_next_completion() {
        let mut deframer = Deframer::new();
        deframer.start_read(127).unwrap();
        deframer.cancel();

        let step = deframer.on_read_done(Ok(&[0xAA])).unwrap();
        assert_eq!(step, DeframerStep::Done(Err(TransferError::Cancelled)));
        assert!(deframer.is_idle());
    }

    #[test]
    fn spurious_completion_ignored() {
        let mut deframer = Deframer::new();
        assert!(deframer.on_read_done(Ok(&[1, 2, 3])).is_none());
    }
}
