//! Runtime error types.

use servolink_core::{MuxError, TransferError};
use thiserror::Error;

/// Errors surfaced through the [`LinkHandle`](crate::LinkHandle) API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The worker is gone; the link stopped or was never started.
    #[error("link worker stopped")]
    Stopped,

    /// The multiplexer rejected the operation synchronously.
    #[error(transparent)]
    Rejected(#[from] MuxError),

    /// The operation started but ended with a terminal transfer status.
    #[error(transparent)]
    Transfer(#[from] TransferError),
}
