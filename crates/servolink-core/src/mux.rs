//! Endpoint request/reply multiplexer.
//!
//! One `EndpointMux` carries both halves of the protocol over a single
//! packet channel pair:
//!
//! - **Client half**: issues endpoint requests, correlates replies by
//!   sequence number through the pending-acks table.
//! - **Server half**: validates inbound requests, invokes the external
//!   [`EndpointHandler`], and sends replies.
//!
//! Both halves share one transmit slot. A client operation accepted while
//! the slot is busy waits in the single queue slot; a third concurrent
//! start is rejected outright. A server reply that cannot be sent parks the
//! inbound packet and pauses reading until the in-flight write completes —
//! the only flow control this protocol has.
//!
//! The mux is Sans-IO: it consumes packet and completion events and emits
//! [`MuxAction`]s for the owner to execute. On packet-oriented transports it
//! is used directly; byte-stream transports wrap it in
//! [`Link`](crate::Link).

use std::collections::HashMap;

use bytes::Bytes;
use servolink_proto::{
    Packet, Reply, Request, ENDPOINT_MASK, PROTOCOL_VERSION, REQUEST_OVERHEAD, SEQ_MARKER_BIT,
    SEQ_MASK,
};
use tracing::{debug, warn};

use crate::{
    endpoints::{EndpointHandler, ResponseWriter},
    error::MuxError,
    transfer::{TransferError, TransferOutcome},
};

/// Identifies one live endpoint operation.
///
/// Wraps the operation's wire sequence number. Handles stay valid until the
/// operation completes; cancelling an unknown handle is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationHandle(u16);

impl OperationHandle {
    /// The operation's wire sequence number.
    #[must_use]
    pub fn seq_no(self) -> u16 {
        self.0
    }
}

/// A client operation from acceptance to completion.
struct Operation {
    seq_no: u16,
    endpoint_id: u16,
    tx: Bytes,
    rx_length: u16,
}

/// Who owns the transmit slot.
enum TxOwner {
    /// A client request is going out. `cancelled` marks an operation whose
    /// cancellation raced the write; the completion reports `Cancelled`
    /// regardless of the write's own outcome.
    Operation { op: Operation, cancelled: bool },

    /// A server reply is going out.
    Reply,
}

/// Actions the mux asks its owner to execute.
#[derive(Debug, PartialEq, Eq)]
pub enum MuxAction {
    /// Submit this packet to the transmit channel.
    Send(Bytes),

    /// Cancel the in-flight transmit (best effort; a completion still
    /// follows).
    CancelSend,

    /// Arm the receive channel for the next packet.
    Receive,

    /// An endpoint operation finished. `Ok` carries the reply payload,
    /// truncated to the requested length.
    Complete {
        /// The finished operation.
        handle: OperationHandle,
        /// Reply bytes or terminal status.
        result: Result<Bytes, TransferError>,
    },
}

/// Request/reply multiplexer over one packet channel pair.
pub struct EndpointMux<H> {
    handler: H,
    tx_mtu: usize,

    /// CRC of the peer's descriptor, cached by discovery. Quoted in request
    /// trailers for non-zero endpoints; zero until discovered.
    peer_descriptor_crc: Option<u16>,

    /// 15-bit sequence counter for outbound requests.
    next_seq: u16,

    /// Operations awaiting their reply, keyed by wire sequence number.
    pending: HashMap<u16, Operation>,

    /// The transmit slot.
    transmitting: Option<TxOwner>,

    /// The single queue slot behind the transmit slot.
    queued: Option<Operation>,

    /// Inbound request parked until the transmit slot frees up. While this
    /// is occupied the receive channel stays un-armed.
    parked: Option<Vec<u8>>,
}

impl<H: EndpointHandler> EndpointMux<H> {
    /// New mux serving `handler`, emitting packets of at most `tx_mtu`
    /// bytes.
    pub fn new(handler: H, tx_mtu: usize) -> Self {
        Self {
            handler,
            tx_mtu,
            peer_descriptor_crc: None,
            next_seq: 0,
            pending: HashMap::new(),
            transmitting: None,
            queued: None,
            parked: None,
        }
    }

    /// Cache the peer's descriptor CRC for subsequent request trailers.
    pub fn set_peer_descriptor_crc(&mut self, crc: u16) {
        self.peer_descriptor_crc = Some(crc);
    }

    /// Start an endpoint operation: send `tx` to `endpoint_id` and expect
    /// up to `rx_length` reply bytes.
    ///
    /// # Errors
    ///
    /// Synchronous rejections per [`MuxError`]; nothing was sent and no
    /// operation exists.
    pub fn start_operation(
        &mut self,
        endpoint_id: u16,
        tx: Bytes,
        rx_length: u16,
    ) -> Result<(OperationHandle, Vec<MuxAction>), MuxError> {
        if tx.len() + REQUEST_OVERHEAD > self.tx_mtu {
            return Err(MuxError::RequestTooLarge { size: tx.len(), mtu: self.tx_mtu });
        }

        self.next_seq = (self.next_seq + 1) & SEQ_MASK;
        let seq_no = self.next_seq | SEQ_MARKER_BIT;

        if self.pending.contains_key(&seq_no)
            || self.queued.as_ref().is_some_and(|op| op.seq_no == seq_no)
            || self.transmitting_seq() == Some(seq_no)
        {
            return Err(MuxError::SequenceInUse { seq_no });
        }

        let op = Operation { seq_no, endpoint_id, tx, rx_length };
        let handle = OperationHandle(seq_no);

        if self.transmitting.is_some() {
            if self.queued.is_some() {
                return Err(MuxError::Backlogged);
            }
            debug!(seq_no, endpoint_id, "transmit slot busy, queueing operation");
            self.queued = Some(op);
            return Ok((handle, Vec::new()));
        }

        let action = self.begin_transmit(op);
        Ok((handle, vec![action]))
    }

    /// Cancel a live operation. Idempotent; unknown handles are a no-op.
    pub fn cancel_operation(&mut self, handle: OperationHandle) -> Vec<MuxAction> {
        let seq_no = handle.seq_no();

        if self.queued.as_ref().is_some_and(|op| op.seq_no == seq_no) {
            self.queued = None;
            return vec![MuxAction::Complete { handle, result: Err(TransferError::Cancelled) }];
        }

        if let Some(TxOwner::Operation { op, cancelled }) = &mut self.transmitting {
            if op.seq_no == seq_no {
                // The write completion will report the cancellation.
                *cancelled = true;
                return vec![MuxAction::CancelSend];
            }
        }

        if self.pending.remove(&seq_no).is_some() {
            return vec![MuxAction::Complete { handle, result: Err(TransferError::Cancelled) }];
        }

        Vec::new()
    }

    /// Feed one inbound packet.
    pub fn on_packet(&mut self, packet: &[u8]) -> Vec<MuxAction> {
        match Packet::parse(packet) {
            Err(err) => {
                warn!(%err, "discarding malformed packet");
                vec![MuxAction::Receive]
            },
            Ok(Packet::Reply(reply)) => self.on_reply(&reply),
            Ok(Packet::Request(request)) => self.on_request(&request, packet),
        }
    }

    /// Feed the completion of the packet most recently submitted with
    /// [`MuxAction::Send`].
    pub fn on_send_done(&mut self, outcome: TransferOutcome) -> Vec<MuxAction> {
        let mut actions = Vec::new();

        match self.transmitting.take() {
            None => {
                warn!("spurious transmit completion");
                return actions;
            },

            Some(TxOwner::Operation { op, cancelled }) => {
                let handle = OperationHandle(op.seq_no);
                if cancelled {
                    // Cancellation raced the write; the race resolves to
                    // `Cancelled` whatever the wire outcome was.
                    actions.push(MuxAction::Complete {
                        handle,
                        result: Err(TransferError::Cancelled),
                    });
                } else {
                    match outcome {
                        Ok(_) => {
                            // Request is on the wire; await its reply.
                            self.pending.insert(op.seq_no, op);
                        },
                        Err(err) => {
                            actions.push(MuxAction::Complete { handle, result: Err(err) });
                        },
                    }
                }
            },

            Some(TxOwner::Reply) => {},
        }

        // The transmit slot is free. Parked server reply first, then the
        // queued client request: finishing responses before starting new
        // requests keeps the peer's timeout window small.
        if let Some(packet) = self.parked.take() {
            actions.extend(self.on_packet(&packet));
            return actions;
        }

        if let Some(op) = self.queued.take() {
            actions.push(self.begin_transmit(op));
        }

        actions
    }

    /// Terminate every live operation with `error` (link closure).
    pub fn on_closed(&mut self, error: TransferError) -> Vec<MuxAction> {
        let mut actions = Vec::new();

        if let Some(TxOwner::Operation { op, .. }) = self.transmitting.take() {
            actions.push(MuxAction::Complete {
                handle: OperationHandle(op.seq_no),
                result: Err(error),
            });
        }

        for (seq_no, _op) in self.pending.drain() {
            actions.push(MuxAction::Complete {
                handle: OperationHandle(seq_no),
                result: Err(error),
            });
        }

        if let Some(op) = self.queued.take() {
            actions.push(MuxAction::Complete {
                handle: OperationHandle(op.seq_no),
                result: Err(error),
            });
        }

        self.parked = None;
        actions
    }

    /// Number of operations awaiting a reply.
    #[must_use]
    pub fn pending_acks(&self) -> usize {
        self.pending.len()
    }

    /// True if the queue slot is occupied.
    #[must_use]
    pub fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    /// Sequence number of the client operation in the transmit slot, if the
    /// slot is held by one.
    #[must_use]
    pub fn transmitting_seq(&self) -> Option<u16> {
        match &self.transmitting {
            Some(TxOwner::Operation { op, .. }) => Some(op.seq_no),
            _ => None,
        }
    }

    /// Number of live client operations, over all three states.
    #[must_use]
    pub fn live_operations(&self) -> usize {
        self.pending.len()
            + usize::from(self.queued.is_some())
            + usize::from(self.transmitting_seq().is_some())
    }

    /// Compose the request for `op` and claim the transmit slot.
    fn begin_transmit(&mut self, op: Operation) -> MuxAction {
        let trailer = if op.endpoint_id & ENDPOINT_MASK == 0 {
            PROTOCOL_VERSION
        } else {
            self.peer_descriptor_crc.unwrap_or(0)
        };

        let packet = Request {
            seq_no: op.seq_no,
            endpoint_id: op.endpoint_id,
            expect_response: true,
            rx_length: op.rx_length,
            payload: &op.tx,
            trailer,
        }
        .encode();

        self.transmitting = Some(TxOwner::Operation { op, cancelled: false });
        MuxAction::Send(packet.into())
    }

    /// Client half: correlate a reply with its pending operation.
    fn on_reply(&mut self, reply: &Reply<'_>) -> Vec<MuxAction> {
        let mut actions = Vec::new();

        match self.pending.remove(&reply.seq_no) {
            None => {
                warn!(seq_no = reply.seq_no, "dropping reply with unknown sequence number");
            },
            Some(op) => {
                let n = reply.payload.len().min(usize::from(op.rx_length));
                actions.push(MuxAction::Complete {
                    handle: OperationHandle(op.seq_no),
                    result: Ok(Bytes::copy_from_slice(&reply.payload[..n])),
                });
            },
        }

        actions.push(MuxAction::Receive);
        actions
    }

    /// Server half: validate, dispatch, and answer an inbound request.
    fn on_request(&mut self, request: &Request<'_>, raw: &[u8]) -> Vec<MuxAction> {
        let mut actions = Vec::new();

        let expected_trailer = if request.endpoint_id == 0 {
            PROTOCOL_VERSION
        } else {
            self.handler.descriptor_crc()
        };

        if request.trailer != expected_trailer {
            debug!(
                endpoint_id = request.endpoint_id,
                expected = expected_trailer,
                got = request.trailer,
                "trailer mismatch, discarding request"
            );
            actions.push(MuxAction::Receive);
            return actions;
        }

        if request.expect_response && self.transmitting.is_some() {
            // The reply needs the transmit slot and it is busy. Park the
            // packet and stop reading; the write completion resumes here.
            debug!(endpoint_id = request.endpoint_id, "transmit slot busy, parking request");
            self.parked = Some(raw.to_vec());
            return actions;
        }

        // Reply length is capped by what our transmit packet can carry.
        let limit = usize::from(request.rx_length).min(self.tx_mtu.saturating_sub(2));
        let mut reply_buf = Vec::with_capacity(limit);
        let mut response = ResponseWriter::new(&mut reply_buf, limit);

        let ok = self.handler.handle(request.endpoint_id, request.payload, &mut response);

        if request.expect_response {
            if ok {
                let packet = Reply::encode(request.seq_no, &reply_buf);
                self.transmitting = Some(TxOwner::Reply);
                actions.push(MuxAction::Send(packet.into()));
            } else {
                debug!(
                    endpoint_id = request.endpoint_id,
                    "handler rejected request, suppressing reply"
                );
            }
        }

        actions.push(MuxAction::Receive);
        actions
    }
}
