//! Sans-IO engines for the servolink device protocol.
//!
//! Three state machines layered over a byte or packet transport:
//!
//! - [`Framer`] / [`Deframer`]: CRC-protected framing over unreliable byte
//!   streams, with bounded-progress resynchronisation on the read side
//! - [`EndpointMux`]: the endpoint request/reply protocol — client half
//!   (pending-acks table, one transmit plus one queue slot) and server half
//!   (dispatch to an [`EndpointHandler`], parked-reply scheduling) over one
//!   shared transmit channel
//! - [`Link`]: the composition of all three for byte-stream transports
//!
//! Every engine consumes completion events and emits actions; no I/O
//! happens here. The `servolink-runtime` crate drives these over real
//! transports with tokio.
//!
//! # Architecture
//!
//! ```text
//! caller ── start_operation ──► Link
//!                                ├─ Framer ────► transmit stream
//!                                ├─ Deframer ◄── receive stream
//!                                └─ EndpointMux ─► EndpointHandler
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod deframer;
mod descriptor;
mod discovery;
mod endpoints;
mod error;
mod framer;
mod link;
mod mux;
mod transfer;

pub use config::LinkConfig;
pub use deframer::{Deframer, DeframerStep};
pub use descriptor::{Descriptor, EndpointRouter};
pub use discovery::{Discovery, DiscoveryStep};
pub use endpoints::{EndpointHandler, EndpointTable, NoEndpoints, ResponseWriter};
pub use error::{DeframerError, FramerError, MuxError};
pub use framer::{Framer, FramerStep};
pub use link::{Link, LinkAction};
pub use mux::{EndpointMux, MuxAction, OperationHandle};
pub use transfer::{TransferError, TransferOutcome};
