//! Write-side framing state machine.
//!
//! Wraps one payload in header and trailer and drives the underlying
//! transmit channel through three sequential writes:
//!
//! `Idle → SendingHeader → SendingPayload → SendingTrailer → Idle`
//!
//! The framer is Sans-IO: [`Framer::start_write`] hands back the first chunk
//! to put on the wire, and each completion fed to [`Framer::on_write_done`]
//! either yields the next chunk or finishes the write. Short completions
//! resubmit the remainder of the current chunk without advancing state.

use bytes::Bytes;
use servolink_proto::frame;

use crate::{
    error::FramerError,
    transfer::{TransferError, TransferOutcome},
};

/// Write-side state. Each variant carries exactly the data valid in it.
enum WriteState {
    /// No write in flight.
    Idle,

    /// One chunk of the frame is on its way to the transmit channel.
    Sending {
        phase: Phase,
        /// Bytes of the current phase.
        chunk: Bytes,
        /// Bytes of `chunk` already accepted by the channel.
        sent: usize,
        payload: Bytes,
        trailer: [u8; frame::TRAILER_SIZE],
    },

    /// Cancelled; the next completion collapses back to idle.
    Cancelling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Header,
    Payload,
    Trailer,
}

/// What to do after a write completion.
#[derive(Debug, PartialEq, Eq)]
pub enum FramerStep {
    /// Hand these bytes to the transmit channel.
    Write(Bytes),

    /// The frame write finished. `Ok` carries the payload length; errors
    /// mean no part of the payload should be considered delivered.
    Done(Result<usize, TransferError>),
}

/// Write-side framer.
pub struct Framer {
    state: WriteState,
}

impl Framer {
    /// New idle framer.
    #[must_use]
    pub fn new() -> Self {
        Self { state: WriteState::Idle }
    }

    /// True if no write is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        matches!(self.state, WriteState::Idle)
    }

    /// Begin writing `payload` as one frame, returning the first chunk for
    /// the transmit channel.
    ///
    /// # Errors
    ///
    /// - `FramerError::Busy` if a write is already in flight
    /// - `FramerError::PayloadTooLarge` above 127 bytes
    pub fn start_write(&mut self, payload: Bytes) -> Result<Bytes, FramerError> {
        if !self.is_idle() {
            return Err(FramerError::Busy);
        }
        if payload.len() > frame::MAX_FRAME_PAYLOAD {
            return Err(FramerError::PayloadTooLarge { size: payload.len() });
        }

        let header = frame::header(payload.len() as u8);
        let trailer = frame::trailer(&payload);
        let chunk = Bytes::copy_from_slice(&header);

        self.state = WriteState::Sending {
            phase: Phase::Header,
            chunk: chunk.clone(),
            sent: 0,
            payload,
            trailer,
        };
        Ok(chunk)
    }

    /// Cancel the in-flight write. Idempotent; a no-op when idle. The
    /// pending completion from the transmit channel still arrives and is
    /// reported as `Cancelled`.
    pub fn cancel(&mut self) {
        if matches!(self.state, WriteState::Sending { .. }) {
            self.state = WriteState::Cancelling;
        }
    }

    /// Feed a completion from the transmit channel.
    ///
    /// Returns `None` if no write was in flight (spurious completion).
    pub fn on_write_done(&mut self, outcome: TransferOutcome) -> Option<FramerStep> {
        match std::mem::replace(&mut self.state, WriteState::Idle) {
            WriteState::Idle => None,

            WriteState::Cancelling => {
                Some(FramerStep::Done(Err(TransferError::Cancelled)))
            },

            WriteState::Sending { phase, chunk, sent, payload, trailer } => match outcome {
                Err(err) => Some(FramerStep::Done(Err(err))),
                Ok(n) => {
                    let sent = sent + n;
                    if sent < chunk.len() {
                        // Short write: resubmit the remainder, same phase.
                        let rest = chunk.slice(sent..);
                        self.state =
                            WriteState::Sending { phase, chunk, sent, payload, trailer };
                        return Some(FramerStep::Write(rest));
                    }
                    Some(self.advance(phase, payload, trailer))
                },
            },
        }
    }

    /// Move to the next phase after the current chunk went out in full.
    fn advance(
        &mut self,
        phase: Phase,
        payload: Bytes,
        trailer: [u8; frame::TRAILER_SIZE],
    ) -> FramerStep {
        let next = match phase {
            Phase::Header if payload.is_empty() => Phase::Trailer,
            Phase::Header => Phase::Payload,
            Phase::Payload => Phase::Trailer,
            Phase::Trailer => {
                return FramerStep::Done(Ok(payload.len()));
            },
        };

        let chunk = match next {
            Phase::Payload => payload.clone(),
            _ => Bytes::copy_from_slice(&trailer),
        };

        self.state = WriteState::Sending {
            phase: next,
            chunk: chunk.clone(),
            sent: 0,
            payload,
            trailer,
        };
        FramerStep::Write(chunk)
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}
