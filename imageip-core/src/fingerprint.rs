//! Visual fingerprint: a digest binding pixel content and attribution.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::attribution::Attribution;
use crate::error::Result;
use crate::pixels::PixelBuffer;

/// Fingerprint size in bytes (256 bits).
pub const FINGERPRINT_SIZE: usize = 32;

/// Byte written between the pixel data and the attribution text.
const PIXEL_ATTRIBUTION_SEPARATOR: u8 = 0x00;

/// SHA3-256 digest over canonical RGB8 pixels and canonical attribution text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    /// Compute the fingerprint of `pixels` bound to `attribution`.
    ///
    /// Alpha is excluded and gray is expanded to RGB before hashing, so the
    /// result depends only on visible color content and the attribution.
    pub fn compute(pixels: &PixelBuffer, attribution: &Attribution) -> Result<Self> {
        let mut hasher = Sha3_256::new();
        hasher.update(pixels.canonical_rgb());
        hasher.update([PIXEL_ATTRIBUTION_SEPARATOR]);
        hasher.update(attribution.canonical_bytes());

        let mut digest = [0u8; FINGERPRINT_SIZE];
        digest.copy_from_slice(&hasher.finalize());
        Ok(Self(digest))
    }

    pub fn from_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::License;

    fn red_2x2() -> PixelBuffer {
        PixelBuffer::rgb(2, 2, [255, 0, 0].repeat(4)).unwrap()
    }

    fn attribution() -> Attribution {
        Attribution::new("A", "B", License::CcBy, 2024)
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let first = Fingerprint::compute(&red_2x2(), &attribution()).unwrap();
        for _ in 0..10 {
            assert_eq!(
                Fingerprint::compute(&red_2x2(), &attribution()).unwrap(),
                first
            );
        }
    }

    #[test]
    fn test_fingerprint_known_construction() {
        // Independent recomputation of the documented byte layout
        let mut hasher = Sha3_256::new();
        hasher.update([255, 0, 0].repeat(4));
        hasher.update([0x00]);
        hasher.update("author=A\u{1f}copyright=B\u{1f}license=CC-BY-4.0\u{1f}year=2024".as_bytes());
        let expected = hex::encode(hasher.finalize());

        let fingerprint = Fingerprint::compute(&red_2x2(), &attribution()).unwrap();
        assert_eq!(fingerprint.to_hex(), expected);
        assert_eq!(fingerprint.to_hex().len(), FINGERPRINT_SIZE * 2);
    }

    #[test]
    fn test_single_bit_pixel_change() {
        let original = Fingerprint::compute(&red_2x2(), &attribution()).unwrap();
        let mut pixels = red_2x2();
        pixels.set_pixel(1, 1, &[254, 0, 0]).unwrap();
        assert_ne!(
            Fingerprint::compute(&pixels, &attribution()).unwrap(),
            original
        );
    }

    #[test]
    fn test_each_attribution_field_matters() {
        let pixels = red_2x2();
        let original = Fingerprint::compute(&pixels, &attribution()).unwrap();

        let perturbed = [
            Attribution::new("A2", "B", License::CcBy, 2024),
            Attribution::new("A", "B2", License::CcBy, 2024),
            Attribution::new("A", "B", License::CcBySa, 2024),
            Attribution::new("A", "B", License::CcBy, 2025),
        ];
        for other in &perturbed {
            assert_ne!(
                Fingerprint::compute(&pixels, other).unwrap(),
                original,
                "changing {other:?} should change the fingerprint"
            );
        }
    }

    #[test]
    fn test_alpha_is_ignored() {
        let opaque = PixelBuffer::new(1, 2, 4, vec![9, 8, 7, 255, 1, 2, 3, 255]).unwrap();
        let translucent = PixelBuffer::new(1, 2, 4, vec![9, 8, 7, 0, 1, 2, 3, 17]).unwrap();
        let rgb = PixelBuffer::rgb(1, 2, vec![9, 8, 7, 1, 2, 3]).unwrap();

        let a = Fingerprint::compute(&opaque, &attribution()).unwrap();
        assert_eq!(a, Fingerprint::compute(&translucent, &attribution()).unwrap());
        assert_eq!(a, Fingerprint::compute(&rgb, &attribution()).unwrap());
    }

    #[test]
    fn test_gray_matches_equivalent_rgb() {
        let gray = PixelBuffer::new(2, 1, 1, vec![40, 200]).unwrap();
        let rgb = PixelBuffer::rgb(2, 1, vec![40, 40, 40, 200, 200, 200]).unwrap();
        assert_eq!(
            Fingerprint::compute(&gray, &attribution()).unwrap(),
            Fingerprint::compute(&rgb, &attribution()).unwrap()
        );
    }

    #[test]
    fn test_display_is_hex() {
        let fingerprint = Fingerprint::from_bytes([0xAB; FINGERPRINT_SIZE]);
        assert_eq!(fingerprint.to_string(), "ab".repeat(FINGERPRINT_SIZE));
    }
}
