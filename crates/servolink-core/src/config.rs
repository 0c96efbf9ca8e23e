//! Link configuration.

use servolink_proto::MAX_FRAME_PAYLOAD;

/// Tunables for one link instance.
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Largest endpoint packet the transmit side may emit, header and
    /// trailer included. Bounded by the transport's packet size; the
    /// default matches a 64-byte USB full-speed bulk packet.
    pub tx_mtu: usize,

    /// Payload capacity the deframer offers per frame read.
    pub rx_mtu: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self { tx_mtu: 64, rx_mtu: MAX_FRAME_PAYLOAD }
    }
}
