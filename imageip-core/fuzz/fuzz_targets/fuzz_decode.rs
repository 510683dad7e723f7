#![no_main]

//! Fuzz target for signature text decoding
//!
//! Feeds arbitrary bytes both as a raw user-comment field and as text.
//! Decoding must never panic, and anything it accepts must re-encode to
//! text that decodes to the same bytes.
//!
//! Run with: cargo +nightly fuzz run fuzz_decode

use imageip_core::codec;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = codec::decode_field(data);

    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(raw) = codec::decode(text) {
            let again = codec::decode(&codec::encode(&raw)).expect("re-encoded text must decode");
            assert_eq!(again, raw);
        }
    }
});
