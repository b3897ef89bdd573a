//! Fuzz target checking that escaped encoding decodes back to its fields.
//!
//! Run with: cargo +nightly fuzz run fuzz_escape_symmetry

#![no_main]

use libfuzzer_sys::fuzz_target;
use openfdd_core::protocol::codec;

fuzz_target!(|fields: Vec<String>| {
    if fields.is_empty() {
        return;
    }

    let line = codec::encode(&fields, false, true);
    let frames = codec::decode_all(&line);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].fields(), fields.as_slice());
});
