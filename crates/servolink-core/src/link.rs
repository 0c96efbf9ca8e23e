//! Stream-based link: framing composed with the endpoint multiplexer.
//!
//! A `Link` runs the endpoint protocol over a raw byte stream (typically
//! a CDC virtual serial line). Inbound bytes pass through
//! the [`Deframer`] into the [`EndpointMux`]; outbound packets from the mux
//! pass through the [`Framer`]. The link owns all three engines and
//! translates between their vocabularies, so its owner only ever sees byte
//! transfers and operation completions.
//!
//! Like everything below it, the link is Sans-IO: the owner executes
//! [`LinkAction`]s against a real transport and feeds completions back in.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::{
    config::LinkConfig,
    deframer::{Deframer, DeframerStep},
    discovery::{Discovery, DiscoveryStep},
    endpoints::EndpointHandler,
    error::MuxError,
    framer::{Framer, FramerStep},
    mux::{EndpointMux, MuxAction, OperationHandle},
    transfer::{TransferError, TransferOutcome},
};

/// Actions the link asks its owner to execute.
#[derive(Debug, PartialEq, Eq)]
pub enum LinkAction {
    /// Submit these bytes to the transmit stream.
    Write(Bytes),

    /// Cancel the in-flight transmit (best effort; a completion still
    /// follows).
    CancelWrite,

    /// Read up to this many bytes from the receive stream.
    Read(usize),

    /// An endpoint operation finished.
    Complete {
        /// The finished operation.
        handle: OperationHandle,
        /// Reply bytes or terminal status.
        result: Result<Bytes, TransferError>,
    },

    /// Descriptor discovery finished; the peer's endpoints are usable.
    RootFound {
        /// The peer's descriptor.
        descriptor: Bytes,
        /// Its CRC, now quoted in request trailers.
        crc: u16,
    },

    /// The link closed after the peer's descriptor had been discovered.
    RootLost,

    /// The link shut down; every operation has been completed with this
    /// error. The owner decides whether to restart.
    Stopped(TransferError),
}

/// The endpoint protocol over one byte-stream pair.
pub struct Link<H> {
    framer: Framer,
    deframer: Deframer,
    mux: EndpointMux<H>,
    discovery: Option<Discovery>,
    root_found: bool,
    config: LinkConfig,
}

impl<H: EndpointHandler> Link<H> {
    /// New link serving `handler`.
    pub fn new(handler: H, config: LinkConfig) -> Self {
        Self {
            framer: Framer::new(),
            deframer: Deframer::new(),
            mux: EndpointMux::new(handler, config.tx_mtu),
            discovery: None,
            root_found: false,
            config,
        }
    }

    /// Bring the link up: arm the receive side and, when `discover_root`
    /// is set, begin fetching the peer's descriptor through endpoint 0.
    pub fn start(&mut self, discover_root: bool) -> Vec<LinkAction> {
        let mut actions = Vec::new();

        match self.deframer.start_read(self.config.rx_mtu) {
            Ok(n) => actions.push(LinkAction::Read(n)),
            Err(err) => warn!(%err, "receive side already armed"),
        }

        if discover_root {
            let discovery = Discovery::new();
            let step = discovery.first_fetch();
            self.discovery = Some(discovery);
            actions.extend(self.drive_discovery(step));
        }

        actions
    }

    /// Start an endpoint operation. See
    /// [`EndpointMux::start_operation`].
    ///
    /// # Errors
    ///
    /// Synchronous rejections per [`MuxError`].
    pub fn start_operation(
        &mut self,
        endpoint_id: u16,
        tx: Bytes,
        rx_length: u16,
    ) -> Result<(OperationHandle, Vec<LinkAction>), MuxError> {
        let (handle, actions) = self.mux.start_operation(endpoint_id, tx, rx_length)?;
        Ok((handle, self.translate(actions)))
    }

    /// Cancel a live operation. Idempotent; unknown handles are a no-op.
    pub fn cancel_operation(&mut self, handle: OperationHandle) -> Vec<LinkAction> {
        let actions = self.mux.cancel_operation(handle);
        self.translate(actions)
    }

    /// Feed a completion from the transmit stream.
    pub fn on_write_done(&mut self, outcome: TransferOutcome) -> Vec<LinkAction> {
        match self.framer.on_write_done(outcome) {
            None => Vec::new(),
            Some(FramerStep::Write(chunk)) => vec![LinkAction::Write(chunk)],
            Some(FramerStep::Done(result)) => {
                let actions = self.mux.on_send_done(result);
                self.translate(actions)
            },
        }
    }

    /// Feed a completion from the receive stream. `data` holds the bytes
    /// actually read.
    pub fn on_read_done(&mut self, data: Result<&[u8], TransferError>) -> Vec<LinkAction> {
        match self.deframer.on_read_done(data) {
            None => Vec::new(),
            Some(DeframerStep::Read(n)) => vec![LinkAction::Read(n)],
            Some(DeframerStep::Done(Ok(payload))) => {
                let actions = self.mux.on_packet(&payload);
                self.translate(actions)
            },
            Some(DeframerStep::Done(Err(TransferError::Cancelled))) => {
                // Mirrors the legacy peer: a cancelled read does not tear
                // the link down, and reading is not re-armed either.
                warn!("receive cancelled, not restarting");
                Vec::new()
            },
            Some(DeframerStep::Done(Err(err))) => self.shutdown(err),
        }
    }

    /// The multiplexer, for introspection in tests and diagnostics.
    #[must_use]
    pub fn mux(&self) -> &EndpointMux<H> {
        &self.mux
    }

    /// Tear everything down after a terminal receive error.
    fn shutdown(&mut self, error: TransferError) -> Vec<LinkAction> {
        debug!(%error, "link shutting down");

        let completions = self.mux.on_closed(error);
        let mut actions = self.translate(completions);

        self.discovery = None;
        if self.root_found {
            self.root_found = false;
            actions.push(LinkAction::RootLost);
        }
        actions.push(LinkAction::Stopped(error));
        actions
    }

    /// Execute mux actions against the framing engines, producing
    /// stream-level actions.
    fn translate(&mut self, mux_actions: Vec<MuxAction>) -> Vec<LinkAction> {
        let mut out = Vec::new();

        for action in mux_actions {
            match action {
                MuxAction::Send(packet) => match self.framer.start_write(packet) {
                    Ok(chunk) => out.push(LinkAction::Write(chunk)),
                    Err(err) => {
                        // The mux never double-books the transmit slot, so
                        // this only fires on an oversized reply; drop it and
                        // let the slot recover.
                        warn!(%err, "framer rejected packet");
                        let followup = self.mux.on_send_done(Err(TransferError::Failed));
                        out.extend(self.translate(followup));
                    },
                },

                MuxAction::CancelSend => {
                    self.framer.cancel();
                    out.push(LinkAction::CancelWrite);
                },

                MuxAction::Receive => match self.deframer.start_read(self.config.rx_mtu) {
                    Ok(n) => out.push(LinkAction::Read(n)),
                    Err(err) => warn!(%err, "receive side already armed"),
                },

                MuxAction::Complete { handle, result } => {
                    let from_discovery =
                        self.discovery.as_ref().is_some_and(|d| d.owns(handle));
                    if from_discovery {
                        let step = match self.discovery.as_mut() {
                            Some(discovery) => discovery.on_result(result),
                            None => continue,
                        };
                        out.extend(self.drive_discovery(step));
                    } else {
                        out.push(LinkAction::Complete { handle, result });
                    }
                },
            }
        }

        out
    }

    /// Act on a discovery step: issue the next fetch or publish the result.
    fn drive_discovery(&mut self, step: DiscoveryStep) -> Vec<LinkAction> {
        match step {
            DiscoveryStep::Fetch { payload, rx_length } => {
                match self.mux.start_operation(0, Bytes::copy_from_slice(&payload), rx_length) {
                    Ok((handle, actions)) => {
                        if let Some(discovery) = self.discovery.as_mut() {
                            discovery.set_handle(handle);
                        }
                        self.translate(actions)
                    },
                    Err(err) => {
                        warn!(%err, "descriptor discovery aborted");
                        self.discovery = None;
                        Vec::new()
                    },
                }
            },

            DiscoveryStep::Found { descriptor, crc } => {
                debug!(crc = format_args!("{crc:#06x}"), "peer descriptor discovered");
                self.discovery = None;
                self.mux.set_peer_descriptor_crc(crc);
                self.root_found = true;
                vec![LinkAction::RootFound { descriptor, crc }]
            },

            DiscoveryStep::Failed(err) => {
                warn!(%err, "descriptor discovery failed");
                self.discovery = None;
                Vec::new()
            },
        }
    }
}
