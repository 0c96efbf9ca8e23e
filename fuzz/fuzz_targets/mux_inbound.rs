//! Fuzz target for the multiplexer's inbound packet path.
//!
//! Arbitrary packets against a live mux with operations in every slot must
//! never panic, and the live-operation accounting must stay consistent.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use servolink_core::{EndpointMux, NoEndpoints};

fuzz_target!(|packets: Vec<Vec<u8>>| {
    let mut mux = EndpointMux::new(NoEndpoints, 64);

    // One awaiting its ack, one transmitting.
    let _ = mux.start_operation(1, Bytes::from_static(b"a"), 8);
    let _ = mux.start_operation(2, Bytes::from_static(b"b"), 8);
    let _ = mux.on_send_done(Ok(1));

    let mut live = mux.live_operations();
    for packet in packets {
        let actions = mux.on_packet(&packet);
        // A hostile packet can complete at most one operation per round.
        let now = mux.live_operations();
        assert!(live - now <= 1);
        live = now;
        drop(actions);
    }
});
