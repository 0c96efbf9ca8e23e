//! Property-based tests for the framing engines and operation accounting.

use bytes::Bytes;
use proptest::prelude::*;
use servolink_core::{
    Deframer, DeframerStep, EndpointMux, Framer, FramerStep, MuxAction, NoEndpoints,
    OperationHandle, TransferError,
};
use servolink_proto::{Packet, MAX_FRAME_PAYLOAD};

/// Drive the framer to completion, concatenating everything it emits.
fn frame_to_wire(payload: &[u8]) -> Vec<u8> {
    let mut framer = Framer::new();
    let mut wire = Vec::new();

    let first = framer.start_write(Bytes::copy_from_slice(payload)).expect("payload in range");
    wire.extend_from_slice(&first);
    let mut pending = first.len();

    loop {
        match framer.on_write_done(Ok(pending)).expect("write in flight") {
            FramerStep::Write(chunk) => {
                wire.extend_from_slice(&chunk);
                pending = chunk.len();
            },
            FramerStep::Done(result) => {
                assert_eq!(result, Ok(payload.len()));
                return wire;
            },
        }
    }
}

/// Feed `wire` to a deframer in the given chunk sizes (cycled), returning
/// the first recovered payload.
fn deframe(wire: &[u8], chunks: &[usize]) -> Option<Bytes> {
    let mut deframer = Deframer::new();
    let mut want = deframer.start_read(MAX_FRAME_PAYLOAD).expect("deframer idle");
    let mut pos = 0;
    let mut turn = 0;

    while pos < wire.len() {
        let chunk = chunks.get(turn % chunks.len()).copied().unwrap_or(1).max(1);
        turn += 1;

        let n = want.min(chunk).min(wire.len() - pos);
        let data = &wire[pos..pos + n];
        pos += n;

        match deframer.on_read_done(Ok(data)).expect("read in flight") {
            DeframerStep::Read(next) => want = next,
            DeframerStep::Done(Ok(payload)) => return Some(payload),
            DeframerStep::Done(Err(_)) => return None,
        }
    }
    None
}

#[test]
fn prop_framer_deframer_round_trip() {
    proptest!(|(
        payload in prop::collection::vec(any::<u8>(), 0..=MAX_FRAME_PAYLOAD),
        chunks in prop::collection::vec(1usize..8, 1..4),
    )| {
        let wire = frame_to_wire(&payload);
        let recovered = deframe(&wire, &chunks);
        prop_assert_eq!(recovered, Some(Bytes::from(payload)));
    });
}

#[test]
fn prop_resync_recovers_frame_after_garbage() {
    proptest!(|(
        // Garbage free of the frame prefix: scanning must walk through all
        // of it and lock onto the real frame.
        garbage in prop::collection::vec(
            any::<u8>().prop_map(|b| if b == 0xAA { 0xAB } else { b }),
            0..48,
        ),
        payload in prop::collection::vec(any::<u8>(), 0..=MAX_FRAME_PAYLOAD),
        chunks in prop::collection::vec(1usize..8, 1..4),
    )| {
        let mut wire = garbage;
        wire.extend_from_slice(&frame_to_wire(&payload));

        let recovered = deframe(&wire, &chunks);
        prop_assert_eq!(recovered, Some(Bytes::from(payload)));
    });
}

/// Random schedule of starts, cancels, and write completions against the
/// client half, checking that handles complete exactly once and that wire
/// sequence numbers always carry the marker bit.
#[test]
fn prop_every_operation_completes_exactly_once() {
    proptest!(|(script in prop::collection::vec(0u8..4, 0..40))| {
        let mut mux = EndpointMux::new(NoEndpoints, 64);
        let mut live: Vec<OperationHandle> = Vec::new();
        let mut completed: Vec<OperationHandle> = Vec::new();
        let mut send_outstanding = false;
        let mut cancel_turn = 0usize;

        let note = |actions: &[MuxAction],
                        live: &mut Vec<OperationHandle>,
                        completed: &mut Vec<OperationHandle>,
                        send_outstanding: &mut bool| {
            for action in actions {
                match action {
                    MuxAction::Send(packet) => {
                        *send_outstanding = true;
                        match Packet::parse(packet).expect("mux emits well-formed packets") {
                            Packet::Request(req) => {
                                prop_assert_ne!(req.seq_no & 0x0080, 0);
                            },
                            Packet::Reply(_) => {},
                        }
                    },
                    MuxAction::Complete { handle, .. } => {
                        prop_assert!(
                            !completed.contains(handle),
                            "handle completed twice"
                        );
                        completed.push(*handle);
                        live.retain(|h| h != handle);
                    },
                    MuxAction::CancelSend | MuxAction::Receive => {},
                }
            }
            Ok(())
        };

        for step in script {
            match step {
                // Start a new operation.
                0 | 1 => {
                    if let Ok((handle, actions)) =
                        mux.start_operation(1, Bytes::from_static(b"op"), 4)
                    {
                        live.push(handle);
                        note(&actions, &mut live, &mut completed, &mut send_outstanding)?;
                    }
                },

                // Complete the outstanding send, if any.
                2 => {
                    if send_outstanding {
                        send_outstanding = false;
                        let actions = mux.on_send_done(Ok(64));
                        note(&actions, &mut live, &mut completed, &mut send_outstanding)?;
                    }
                },

                // Cancel some live operation.
                _ => {
                    if !live.is_empty() {
                        cancel_turn = (cancel_turn + 1) % live.len();
                        let handle = live[cancel_turn];
                        let actions = mux.cancel_operation(handle);
                        note(&actions, &mut live, &mut completed, &mut send_outstanding)?;
                    }
                },
            }

            // Pending acks plus the two slots account for every live
            // operation, no more, no less.
            prop_assert_eq!(
                mux.live_operations(),
                mux.pending_acks()
                    + usize::from(mux.has_queued())
                    + usize::from(mux.transmitting_seq().is_some())
            );
            prop_assert_eq!(mux.live_operations(), live.len());
        }

        // Closing the link completes everything still live.
        let actions = mux.on_closed(TransferError::Closed);
        note(&actions, &mut live, &mut completed, &mut send_outstanding)?;

        prop_assert!(live.is_empty(), "operations left incomplete after closure");
        prop_assert_eq!(mux.live_operations(), 0);
    });
}
