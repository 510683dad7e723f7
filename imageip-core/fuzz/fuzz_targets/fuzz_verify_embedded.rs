#![no_main]

//! Fuzz target for verification from embedded metadata
//!
//! Splits the input into attribution and user-comment fields and verifies
//! them against a fixed image. Garbage fields must resolve to a result or
//! an error, never a panic.
//!
//! Run with: cargo +nightly fuzz run fuzz_verify_embedded

use std::sync::{Arc, OnceLock};

use imageip_core::{
    EmbeddedFields, KeyAuthority, KeyIdentity, MemoryKeyAuthority, PixelBuffer, SignerVerifier,
};
use libfuzzer_sys::fuzz_target;

fn fixture() -> &'static (SignerVerifier, KeyIdentity, PixelBuffer) {
    static FIXTURE: OnceLock<(SignerVerifier, KeyIdentity, PixelBuffer)> = OnceLock::new();
    FIXTURE.get_or_init(|| {
        let authority = Arc::new(MemoryKeyAuthority::new());
        let key = authority.generate("fuzz@example.com").expect("key generation");
        let pixels = PixelBuffer::rgb(2, 2, vec![255; 12]).expect("pixels");
        (SignerVerifier::new(authority), key, pixels)
    })
}

fuzz_target!(|data: &[u8]| {
    let mut parts = data.splitn(5, |&b| b == 0xFF);
    let mut next = || parts.next().unwrap_or_default().to_vec();

    let fields = EmbeddedFields {
        artist: String::from_utf8_lossy(&next()).into_owned(),
        copyright: String::from_utf8_lossy(&next()).into_owned(),
        xp_author: next(),
        xp_keywords: next(),
        xp_comment: Vec::new(),
        user_comment: Some(next()),
    };

    let (signer, key, pixels) = fixture();
    let _ = signer.verify_embedded(pixels, &fields, key);
});
