//! Fuzz target for the streaming deframer.
//!
//! Feeds arbitrary bytes in arbitrary chunk sizes and checks the
//! forward-progress guarantee: the deframer always asks for more bytes or
//! completes, and never requests a zero-length read.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use servolink_core::{Deframer, DeframerStep};

#[derive(Arbitrary, Debug)]
struct Input {
    stream: Vec<u8>,
    chunks: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mut deframer = Deframer::new();
    let mut want = deframer.start_read(127).expect("fresh deframer is idle");
    let mut pos = 0;
    let mut turn = 0;

    while pos < input.stream.len() {
        assert!(want > 0, "zero-length read requested");

        let chunk = usize::from(*input.chunks.get(turn % input.chunks.len().max(1)).unwrap_or(&1))
            .clamp(1, want);
        turn += 1;

        let n = chunk.min(input.stream.len() - pos);
        let data = &input.stream[pos..pos + n];
        pos += n;

        match deframer.on_read_done(Ok(data)).expect("read in flight") {
            DeframerStep::Read(next) => want = next,
            DeframerStep::Done(result) => {
                let payload = result.expect("only transport errors fail a read");
                assert!(payload.len() <= 127);
                want = deframer.start_read(127).expect("deframer idle after completion");
            },
        }
    }
});
