//! Client-side descriptor discovery.
//!
//! Endpoint 0 is the bootstrap: its requests carry the protocol version as
//! trailer, so a client can talk to it before knowing the peer's descriptor
//! CRC. Discovery reads the descriptor in offset-addressed chunks, finishes
//! on the first empty chunk, and computes the CRC that unlocks every other
//! endpoint.

use bytes::Bytes;
use servolink_proto::crc::{crc16, CRC16_INIT};

use crate::{mux::OperationHandle, transfer::TransferError};

/// Reply bytes requested per chunk. The server clips each reply to its own
/// transmit MTU, so termination must not rely on full-length chunks; any
/// non-empty reply advances the offset by what actually arrived.
const CHUNK: u16 = 32;

/// Next move of the discovery state machine.
#[derive(Debug, PartialEq, Eq)]
pub enum DiscoveryStep {
    /// Issue an endpoint-0 operation: 4-byte little-endian offset payload,
    /// `rx_length` reply bytes wanted.
    Fetch {
        /// Request payload (the read offset).
        payload: [u8; 4],
        /// Reply bytes to ask for.
        rx_length: u16,
    },

    /// The whole descriptor arrived.
    Found {
        /// Descriptor bytes.
        descriptor: Bytes,
        /// CRC-16 over the descriptor, to be cached for request trailers.
        crc: u16,
    },

    /// An endpoint operation failed; discovery stops.
    Failed(TransferError),
}

/// Chunked fetch of the peer's descriptor through endpoint 0.
pub struct Discovery {
    buf: Vec<u8>,
    offset: u32,
    handle: Option<OperationHandle>,
}

impl Discovery {
    /// New discovery at offset zero.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: Vec::new(), offset: 0, handle: None }
    }

    /// The first fetch to issue.
    #[must_use]
    pub fn first_fetch(&self) -> DiscoveryStep {
        DiscoveryStep::Fetch { payload: self.offset.to_le_bytes(), rx_length: CHUNK }
    }

    /// Record the handle of the operation issued for the last `Fetch`.
    pub fn set_handle(&mut self, handle: OperationHandle) {
        self.handle = Some(handle);
    }

    /// True if `handle` belongs to the fetch currently in flight.
    #[must_use]
    pub fn owns(&self, handle: OperationHandle) -> bool {
        self.handle == Some(handle)
    }

    /// Feed the completion of the in-flight fetch.
    pub fn on_result(&mut self, result: Result<Bytes, TransferError>) -> DiscoveryStep {
        self.handle = None;

        match result {
            Err(err) => DiscoveryStep::Failed(err),
            Ok(chunk) if chunk.is_empty() => {
                let descriptor = Bytes::from(std::mem::take(&mut self.buf));
                let crc = crc16(CRC16_INIT, &descriptor);
                DiscoveryStep::Found { descriptor, crc }
            },
            Ok(chunk) => {
                self.buf.extend_from_slice(&chunk);
                self.offset += chunk.len() as u32;
                DiscoveryStep::Fetch { payload: self.offset.to_le_bytes(), rx_length: CHUNK }
            },
        }
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}
