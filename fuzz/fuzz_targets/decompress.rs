#![no_main]
use libfuzzer_sys::fuzz_target;
use squish::{AttrType, Decompressor, Schema};

// A header may claim far more tuples than the input could hold when every
// model is constant, so decoding stops after a fixed number of tuples.
const MAX_TUPLES: usize = 10_000;

fuzz_target!(|data: &[u8]| {
    let schema = Schema::new(vec![
        AttrType::Enum { cap: 5 },
        AttrType::Integer,
        AttrType::Real,
        AttrType::String,
    ]);
    let Ok(decompressor) = Decompressor::new(data, schema) else {
        return;
    };
    for tuple in decompressor.take(MAX_TUPLES) {
        if tuple.is_err() {
            return;
        }
    }
});
