//! The link worker: one task owning all protocol state.
//!
//! Mirrors the firmware side of the link — there, interrupt handlers post
//! event codes to a bounded queue and one thread drains it, mutating
//! protocol state. Here the transfer tasks and API handles post [`Event`]s
//! onto a bounded mpsc queue and a single worker task drains it, driving
//! the Sans-IO [`Link`]. Protocol state is never touched from anywhere
//! else, and at most one transfer per direction is in flight.

use std::collections::HashMap;

use bytes::Bytes;
use servolink_core::{
    EndpointHandler, Link, LinkAction, LinkConfig, MuxError, OperationHandle, TransferError,
    TransferOutcome,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    channel::{RxChannel, TxChannel},
    error::RuntimeError,
};

/// Worker configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerConfig {
    /// Engine tunables.
    pub link: LinkConfig,

    /// Fetch the peer's descriptor at startup (client-side links).
    pub discover_root: bool,
}

/// Events drained by the worker. Everything that can happen to the link
/// arrives here; nothing mutates protocol state from outside.
enum Event {
    Command(Command),
    WriteDone(TransferOutcome),
    ReadDone(Result<Vec<u8>, TransferError>),
}

/// API requests relayed from [`LinkHandle`]s.
enum Command {
    Start {
        endpoint_id: u16,
        tx: Bytes,
        rx_length: u16,
        reply: oneshot::Sender<Result<Accepted, MuxError>>,
    },
    Cancel(OperationHandle),
}

/// A successfully accepted operation.
struct Accepted {
    handle: OperationHandle,
    completion: oneshot::Receiver<Result<Bytes, TransferError>>,
}

/// Out-of-band link events for the owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkNotification {
    /// Descriptor discovery finished.
    RootFound {
        /// The peer's descriptor bytes.
        descriptor: Bytes,
        /// Its CRC-16.
        crc: u16,
    },

    /// The link closed after the descriptor had been discovered.
    RootLost,

    /// The link shut down with this status; the worker has exited.
    Stopped(TransferError),
}

/// Depth of the bounded event queue feeding the worker.
const EVENT_QUEUE_DEPTH: usize = 16;

/// Handle for starting and cancelling endpoint operations.
#[derive(Clone)]
pub struct LinkHandle {
    events: mpsc::Sender<Event>,
}

impl LinkHandle {
    /// Start an endpoint operation: send `tx` to `endpoint_id`, expecting
    /// up to `rx_length` reply bytes.
    ///
    /// Resolves once the worker has accepted (or rejected) the operation;
    /// the returned [`PendingOperation`] is awaited separately for the
    /// reply.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Rejected` for synchronous mux rejections
    /// - `RuntimeError::Stopped` if the worker is gone
    pub async fn start_operation(
        &self,
        endpoint_id: u16,
        tx: Bytes,
        rx_length: u16,
    ) -> Result<PendingOperation, RuntimeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.events
            .send(Event::Command(Command::Start { endpoint_id, tx, rx_length, reply: reply_tx }))
            .await
            .map_err(|_| RuntimeError::Stopped)?;

        let accepted = reply_rx.await.map_err(|_| RuntimeError::Stopped)??;
        Ok(PendingOperation {
            handle: accepted.handle,
            completion: accepted.completion,
            events: self.events.clone(),
        })
    }

    /// Start an operation and wait for its reply in one call.
    pub async fn call(
        &self,
        endpoint_id: u16,
        tx: Bytes,
        rx_length: u16,
    ) -> Result<Bytes, RuntimeError> {
        self.start_operation(endpoint_id, tx, rx_length).await?.wait().await
    }
}

/// An accepted operation awaiting its reply.
pub struct PendingOperation {
    handle: OperationHandle,
    completion: oneshot::Receiver<Result<Bytes, TransferError>>,
    events: mpsc::Sender<Event>,
}

impl PendingOperation {
    /// The operation's handle.
    #[must_use]
    pub fn handle(&self) -> OperationHandle {
        self.handle
    }

    /// Request cancellation. Idempotent and best-effort; the completion
    /// still arrives through [`Self::wait`], as `Cancelled` if the
    /// cancellation won the race.
    pub async fn cancel(&self) {
        let _ = self.events.send(Event::Command(Command::Cancel(self.handle))).await;
    }

    /// Wait for the reply.
    ///
    /// # Errors
    ///
    /// - `RuntimeError::Transfer` with the operation's terminal status
    /// - `RuntimeError::Stopped` if the worker died without completing it
    pub async fn wait(self) -> Result<Bytes, RuntimeError> {
        match self.completion.await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(RuntimeError::Transfer(err)),
            Err(_) => Err(RuntimeError::Stopped),
        }
    }
}

/// Spawn the worker and its two transfer tasks over a transport pair.
///
/// Returns the operation API handle and the out-of-band notification
/// stream. The worker exits when the link stops; the transfer tasks follow
/// once their request channels close.
pub fn spawn<H, T, R>(
    handler: H,
    tx: T,
    rx: R,
    config: WorkerConfig,
) -> (LinkHandle, mpsc::Receiver<LinkNotification>)
where
    H: EndpointHandler + Send + 'static,
    T: TxChannel + 'static,
    R: RxChannel + 'static,
{
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let (notify_tx, notify_rx) = mpsc::channel(8);
    let (write_req_tx, write_req_rx) = mpsc::channel(1);
    let (read_req_tx, read_req_rx) = mpsc::channel(1);

    tokio::spawn(write_task(tx, write_req_rx, events_tx.clone()));
    tokio::spawn(read_task(rx, read_req_rx, events_tx.clone()));

    let link = Link::new(handler, config.link);
    tokio::spawn(worker(link, config, events_rx, write_req_tx, read_req_tx, notify_tx));

    (LinkHandle { events: events_tx }, notify_rx)
}

/// The single task that owns and mutates all protocol state.
async fn worker<H: EndpointHandler + Send>(
    mut link: Link<H>,
    config: WorkerConfig,
    mut events: mpsc::Receiver<Event>,
    write_req: mpsc::Sender<Bytes>,
    read_req: mpsc::Sender<usize>,
    notify: mpsc::Sender<LinkNotification>,
) {
    let mut completions: HashMap<OperationHandle, oneshot::Sender<Result<Bytes, TransferError>>> =
        HashMap::new();

    // Link-up: arm the engines.
    let actions = link.start(config.discover_root);
    let mut running =
        execute(actions, &mut completions, &write_req, &read_req, &notify).await;

    while running {
        let Some(event) = events.recv().await else {
            break;
        };

        let actions = match event {
            Event::Command(Command::Start { endpoint_id, tx, rx_length, reply }) => {
                match link.start_operation(endpoint_id, tx, rx_length) {
                    Err(err) => {
                        let _ = reply.send(Err(err));
                        Vec::new()
                    },
                    Ok((handle, actions)) => {
                        let (done_tx, done_rx) = oneshot::channel();
                        completions.insert(handle, done_tx);
                        let _ = reply.send(Ok(Accepted { handle, completion: done_rx }));
                        actions
                    },
                }
            },

            Event::Command(Command::Cancel(handle)) => link.cancel_operation(handle),
            Event::WriteDone(outcome) => link.on_write_done(outcome),
            Event::ReadDone(Ok(data)) => link.on_read_done(Ok(data.as_slice())),
            Event::ReadDone(Err(err)) => link.on_read_done(Err(err)),
        };

        running = execute(actions, &mut completions, &write_req, &read_req, &notify).await;
    }

    debug!("link worker exiting");
}

/// Execute link actions against the transfer tasks and API waiters.
/// Returns `false` once the link reports itself stopped.
async fn execute(
    actions: Vec<LinkAction>,
    completions: &mut HashMap<OperationHandle, oneshot::Sender<Result<Bytes, TransferError>>>,
    write_req: &mpsc::Sender<Bytes>,
    read_req: &mpsc::Sender<usize>,
    notify: &mpsc::Sender<LinkNotification>,
) -> bool {
    let mut running = true;

    for action in actions {
        match action {
            LinkAction::Write(bytes) => {
                if write_req.send(bytes).await.is_err() {
                    warn!("write task gone");
                }
            },

            // The transfer tasks cannot abort an in-flight transfer; the
            // completion still arrives and resolves the cancellation.
            LinkAction::CancelWrite => {},

            LinkAction::Read(n) => {
                if read_req.send(n).await.is_err() {
                    warn!("read task gone");
                }
            },

            LinkAction::Complete { handle, result } => match completions.remove(&handle) {
                Some(done) => {
                    let _ = done.send(result);
                },
                None => debug!(?handle, "completion with no waiter"),
            },

            LinkAction::RootFound { descriptor, crc } => {
                let _ = notify.send(LinkNotification::RootFound { descriptor, crc }).await;
            },

            LinkAction::RootLost => {
                let _ = notify.send(LinkNotification::RootLost).await;
            },

            LinkAction::Stopped(err) => {
                // Anyone still waiting learns about the stop through their
                // dropped completion channel.
                completions.clear();
                let _ = notify.send(LinkNotification::Stopped(err)).await;
                running = false;
            },
        }
    }

    running
}

/// Serialises writes onto the transmit channel, one at a time.
async fn write_task<T: TxChannel>(
    mut channel: T,
    mut requests: mpsc::Receiver<Bytes>,
    events: mpsc::Sender<Event>,
) {
    while let Some(buf) = requests.recv().await {
        let outcome = channel.write(&buf).await;
        if events.send(Event::WriteDone(outcome)).await.is_err() {
            break;
        }
    }
}

/// Serialises reads from the receive channel, one at a time.
async fn read_task<R: RxChannel>(
    mut channel: R,
    mut requests: mpsc::Receiver<usize>,
    events: mpsc::Sender<Event>,
) {
    while let Some(len) = requests.recv().await {
        let mut buf = vec![0u8; len];
        let outcome = match channel.read(&mut buf).await {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            },
            Err(err) => Err(err),
        };
        if events.send(Event::ReadDone(outcome)).await.is_err() {
            break;
        }
    }
}
