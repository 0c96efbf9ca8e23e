//! Fuzz target for strict frame decoding.
//!
//! Arbitrary bytes must never panic the decoder; invalid input returns an
//! error, valid input round-trips through encode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use servolink_proto::frame;

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = frame::decode(data) {
        let reencoded = frame::encode(payload).expect("decoded payload is within the limit");
        assert_eq!(reencoded, data, "decode/encode must be inverse on valid frames");
    }
});
