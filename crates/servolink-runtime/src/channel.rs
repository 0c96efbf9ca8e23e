//! Byte-channel seams between the worker and real transports.
//!
//! The worker drives one [`TxChannel`] and one [`RxChannel`], submitting at
//! most one transfer per direction at a time. Short transfers are valid
//! completions; the Sans-IO engines resubmit remainders themselves.
//!
//! Blanket adapters cover every tokio [`AsyncWrite`]/[`AsyncRead`] type, so
//! TCP streams, serial ports, and in-memory duplex pairs all plug in after
//! a `tokio::io::split`.

use async_trait::async_trait;
use servolink_core::TransferError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Transmit side of a byte transport.
#[async_trait]
pub trait TxChannel: Send {
    /// Write some prefix of `buf`, returning how many bytes were accepted.
    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransferError>;
}

/// Receive side of a byte transport.
#[async_trait]
pub trait RxChannel: Send {
    /// Read up to `buf.len()` bytes, returning how many arrived.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError>;
}

#[async_trait]
impl<W> TxChannel for W
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransferError> {
        match AsyncWriteExt::write(self, buf).await {
            Ok(0) if !buf.is_empty() => Err(TransferError::Closed),
            Ok(n) => Ok(n),
            Err(err) => Err(map_io_error(&err)),
        }
    }
}

#[async_trait]
impl<R> RxChannel for R
where
    R: AsyncRead + Unpin + Send,
{
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransferError> {
        match AsyncReadExt::read(self, buf).await {
            // EOF on a non-empty read means the peer went away.
            Ok(0) if !buf.is_empty() => Err(TransferError::Closed),
            Ok(n) => Ok(n),
            Err(err) => Err(map_io_error(&err)),
        }
    }
}

/// Collapse I/O errors onto the link's status taxonomy.
fn map_io_error(err: &std::io::Error) -> TransferError {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::BrokenPipe
        | ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionReset
        | ErrorKind::NotConnected
        | ErrorKind::UnexpectedEof => TransferError::Closed,
        _ => {
            warn!(%err, "transport error");
            TransferError::Failed
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplex_round_trips_bytes() {
        let (a, b) = tokio::io::duplex(64);
        let (mut rx, _keep) = tokio::io::split(a);
        let (_keep2, mut tx) = tokio::io::split(b);

        let n = TxChannel::write(&mut tx, b"ping").await.unwrap();
        assert_eq!(n, 4);

        let mut buf = [0u8; 8];
        let n = RxChannel::read(&mut rx, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ping");
    }

    #[tokio::test]
    async fn eof_maps_to_closed() {
        let (a, b) = tokio::io::duplex(64);
        drop(b);
        let (mut rx, _tx) = tokio::io::split(a);

        let mut buf = [0u8; 4];
        assert_eq!(RxChannel::read(&mut rx, &mut buf).await, Err(TransferError::Closed));
    }
}
