//! Tokio runtime glue for the servolink protocol.
//!
//! The Sans-IO engines in `servolink-core` become a running link here:
//!
//! - [`spawn`] starts one worker task owning a [`Link`](servolink_core::Link)
//!   plus two transfer tasks, wired together by a bounded event queue
//! - [`LinkHandle`] starts and cancels endpoint operations from anywhere
//! - [`TxChannel`] / [`RxChannel`] adapt any tokio `AsyncWrite`/`AsyncRead`
//!   pair as the transport
//!
//! The concurrency model matches the firmware on the far side of the
//! link: transfer completions are posted as events onto one bounded queue
//! and a single worker drains it, so all protocol state stays on one task.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod channel;
mod error;
mod worker;

pub use channel::{RxChannel, TxChannel};
pub use error::RuntimeError;
pub use worker::{spawn, LinkHandle, LinkNotification, PendingOperation, WorkerConfig};
