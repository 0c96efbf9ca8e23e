//! Fuzz target for endpoint packet classification and parsing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use servolink_proto::Packet;

fuzz_target!(|data: &[u8]| {
    // Must never panic; replies and requests re-encode consistently.
    match Packet::parse(data) {
        Ok(Packet::Request(request)) => {
            let reencoded = request.encode();
            assert_eq!(reencoded, data);
        },
        Ok(Packet::Reply(_)) | Err(_) => {},
    }
});
