//! Transfer status shared by every layer of the link.

use thiserror::Error;

/// Terminal failure of a byte transfer or endpoint operation.
///
/// Together with success these are the four statuses the legacy peer knows:
/// ok, closed, cancelled, error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransferError {
    /// The link went down; nothing is usable until a restart.
    #[error("link closed")]
    Closed,

    /// The transfer was cancelled from above.
    #[error("transfer cancelled")]
    Cancelled,

    /// Transport or protocol fault. The caller may recover; the core does
    /// not retry.
    #[error("transfer failed")]
    Failed,
}

/// Completion of one underlying byte transfer: bytes moved, or a terminal
/// error. Short transfers are valid completions; the engines resubmit the
/// remainder themselves.
pub type TransferOutcome = Result<usize, TransferError>;
