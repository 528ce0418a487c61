//! Fuzz target: `decode_packet`
//!
//! Arbitrary bytes must never panic the decoder, and anything it accepts
//! must re-encode into a frame that decodes to the same packet.
//!
//! cargo fuzz run fuzz_packet_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use repclip::protocol::{decode_packet, encode, MAX_FRAME_LEN};

fuzz_target!(|data: &[u8]| {
    let Ok(packet) = decode_packet(data) else {
        return;
    };
    assert!(data.len() <= MAX_FRAME_LEN, "accepted an oversized frame");

    let frame = encode(&packet).expect("decoded packet must re-encode");
    assert_eq!(decode_packet(&frame), Ok(packet));
});
