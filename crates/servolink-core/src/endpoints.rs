//! Server-side endpoint dispatch surface.
//!
//! The multiplexer hands every validated inbound request to an
//! [`EndpointHandler`]. The handler consumes the request payload and
//! produces reply bytes through a capped [`ResponseWriter`]; whatever it
//! wrote defines the reply length. Returning `false` marks the request
//! malformed and suppresses the reply entirely (the peer times out).

use tracing::warn;

/// External endpoint dispatcher the multiplexer's server half invokes.
pub trait EndpointHandler {
    /// Serve one request against `endpoint_id`.
    ///
    /// `input` is the opaque request payload (fixed fields and trailer
    /// already stripped). Reply bytes go through `response`, which enforces
    /// the negotiated length cap. Return `false` to reject the request; no
    /// reply is sent then.
    fn handle(&mut self, endpoint_id: u16, input: &[u8], response: &mut ResponseWriter<'_>)
        -> bool;

    /// CRC of the hosted descriptor. Requests to non-zero endpoints must
    /// quote this value in their trailer or they are discarded.
    fn descriptor_crc(&self) -> u16;
}

/// Application endpoint table serving endpoints other than 0.
///
/// Implemented by application code; endpoint 0 is reserved for the
/// descriptor and served by [`EndpointRouter`](crate::EndpointRouter).
pub trait EndpointTable {
    /// Serve one request. Same contract as [`EndpointHandler::handle`].
    fn handle(&mut self, endpoint_id: u16, input: &[u8], response: &mut ResponseWriter<'_>)
        -> bool;
}

/// Length-capped reply buffer handed to endpoint handlers.
///
/// The cap is `min(requested reply length, tx_mtu - 2)`; writes beyond it
/// are silently clipped, matching the wire contract that a reply may be
/// shorter than requested but never longer.
pub struct ResponseWriter<'a> {
    buf: &'a mut Vec<u8>,
    limit: usize,
}

impl<'a> ResponseWriter<'a> {
    pub(crate) fn new(buf: &'a mut Vec<u8>, limit: usize) -> Self {
        Self { buf, limit }
    }

    /// Total bytes this reply may carry.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.limit
    }

    /// Bytes still available.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.limit - self.buf.len()
    }

    /// Append up to `remaining()` bytes of `data`, returning how many were
    /// taken.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        self.buf.extend_from_slice(&data[..n]);
        n
    }

    /// Append a little-endian `u32` in full, or nothing. Returns whether it
    /// fit.
    pub fn write_u32_le(&mut self, value: u32) -> bool {
        if self.remaining() < 4 {
            return false;
        }
        self.buf.extend_from_slice(&value.to_le_bytes());
        true
    }
}

/// Handler for client-only links that host no endpoints.
///
/// Every inbound request is rejected, so no replies are ever produced.
pub struct NoEndpoints;

impl EndpointHandler for NoEndpoints {
    fn handle(
        &mut self,
        endpoint_id: u16,
        _input: &[u8],
        _response: &mut ResponseWriter<'_>,
    ) -> bool {
        warn!(endpoint_id, "request received but no endpoints are hosted");
        false
    }

    fn descriptor_crc(&self) -> u16 {
        0
    }
}
