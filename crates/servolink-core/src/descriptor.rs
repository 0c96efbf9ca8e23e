//! Hosted self-description and the endpoint-0 read service.
//!
//! A server publishes an opaque descriptor blob (a JSON interface
//! definition on the device side). Endpoint 0 is the bootstrap that
//! lets a peer fetch it before knowing anything else: its trailer is the
//! protocol version constant instead of the descriptor CRC, and its payload
//! is a plain 32-bit read offset.

use bytes::Bytes;
use servolink_proto::{
    crc::{crc16, CRC16_INIT},
    PROTOCOL_VERSION,
};

use crate::endpoints::{EndpointHandler, EndpointTable, ResponseWriter};

/// Offset value requesting the descriptor version id instead of bytes.
const VERSION_PROBE: u32 = u32::MAX;

/// The descriptor blob a server publishes, with its derived identity.
pub struct Descriptor {
    bytes: Bytes,
    crc: u16,
    version_id: u32,
}

impl Descriptor {
    /// Host `bytes` as the self-description.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let crc = crc16(CRC16_INIT, &bytes);
        let version_id = (u32::from(PROTOCOL_VERSION) << 16) | u32::from(crc);
        Self { bytes, crc, version_id }
    }

    /// The raw descriptor bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// CRC-16 of the descriptor; peers quote this in request trailers.
    #[must_use]
    pub fn crc(&self) -> u16 {
        self.crc
    }

    /// 32-bit version id served for the `0xFFFF_FFFF` offset probe.
    #[must_use]
    pub fn version_id(&self) -> u32 {
        self.version_id
    }

    /// Serve one endpoint-0 read.
    ///
    /// `input` must begin with a 32-bit little-endian offset; anything
    /// shorter fails the request. An offset past the end is a valid read
    /// producing zero bytes.
    pub fn serve(&self, input: &[u8], response: &mut ResponseWriter<'_>) -> bool {
        let Some(offset_bytes) = input.get(..4) else {
            return false;
        };
        let offset = u32::from_le_bytes([
            offset_bytes[0],
            offset_bytes[1],
            offset_bytes[2],
            offset_bytes[3],
        ]);

        if offset == VERSION_PROBE {
            return response.write_u32_le(self.version_id);
        }

        let offset = offset as usize;
        if offset >= self.bytes.len() {
            return true;
        }

        response.write(&self.bytes[offset..]);
        true
    }
}

/// Routes endpoint 0 to the hosted [`Descriptor`] and everything else to an
/// application [`EndpointTable`].
pub struct EndpointRouter<T> {
    descriptor: Descriptor,
    table: T,
}

impl<T> EndpointRouter<T> {
    /// Build a router hosting `descriptor` in front of `table`.
    pub fn new(descriptor: Descriptor, table: T) -> Self {
        Self { descriptor, table }
    }

    /// The hosted descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }
}

impl<T: EndpointTable> EndpointHandler for EndpointRouter<T> {
    fn handle(
        &mut self,
        endpoint_id: u16,
        input: &[u8],
        response: &mut ResponseWriter<'_>,
    ) -> bool {
        if endpoint_id == 0 {
            self.descriptor.serve(input, response)
        } else {
            self.table.handle(endpoint_id, input, response)
        }
    }

    fn descriptor_crc(&self) -> u16 {
        self.descriptor.crc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn respond(descriptor: &Descriptor, input: &[u8], limit: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        let mut writer = ResponseWriter::new(&mut buf, limit);
        descriptor.serve(input, &mut writer).then_some(buf)
    }

    #[test]
    fn version_probe_returns_version_id() {
        let descriptor = Descriptor::new(&b"{\"endpoints\":[]}"[..]);
        let reply = respond(&descriptor, &u32::MAX.to_le_bytes(), 8).unwrap();
        assert_eq!(reply, descriptor.version_id().to_le_bytes());
    }

    #[test]
    fn version_id_embeds_protocol_version_and_crc() {
        let descriptor = Descriptor::new(&b"blob"[..]);
        assert_eq!(descriptor.version_id() >> 16, u32::from(PROTOCOL_VERSION));
        assert_eq!(descriptor.version_id() & 0xFFFF, u32::from(descriptor.crc()));
    }

    #[test]
    fn offset_read_returns_slice() {
        let descriptor = Descriptor::new(&b"0123456789"[..]);
        let reply = respond(&descriptor, &4u32.to_le_bytes(), 3).unwrap();
        assert_eq!(reply, b"456");
    }

    #[test]
    fn offset_zero_reads_from_start() {
        let descriptor = Descriptor::new(&b"0123456789"[..]);
        let reply = respond(&descriptor, &0u32.to_le_bytes(), 8).unwrap();
        assert_eq!(reply, b"01234567");
    }

    #[test]
    fn offset_past_end_is_empty_success() {
        let descriptor = Descriptor::new(&b"short"[..]);
        let reply = respond(&descriptor, &100u32.to_le_bytes(), 8).unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn short_input_fails() {
        let descriptor = Descriptor::new(&b"blob"[..]);
        assert!(respond(&descriptor, &[0x00, 0x00], 8).is_none());
        assert!(respond(&descriptor, &[], 8).is_none());
    }

    #[test]
    fn version_probe_needs_four_output_bytes() {
        let descriptor = Descriptor::new(&b"blob"[..]);
        assert!(respond(&descriptor, &u32::MAX.to_le_bytes(), 3).is_none());
    }
}
