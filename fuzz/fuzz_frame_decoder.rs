//! Fuzz target for the line decoder.
//!
//! Run with: cargo +nightly fuzz run fuzz_frame_decoder
//!
//! Arbitrary daemon output must never panic the decoder, and every decoded
//! frame must carry at least one field.

#![no_main]

use libfuzzer_sys::fuzz_target;
use openfdd_core::protocol::{FrameDecoder, codec};

fuzz_target!(|data: &[u8]| {
    let frames = codec::decode_all(data);
    for frame in &frames {
        assert!(!frame.fields().is_empty());
        let _ = frame.terminal();
    }

    // Byte-at-a-time decoding agrees with the batch helper.
    let mut decoder = FrameDecoder::new();
    let streamed: Vec<_> = data.iter().filter_map(|&b| decoder.push(b)).collect();
    assert_eq!(streamed, frames);
});
