//! Signing and verification of image fingerprints.
//!
//! A signature binds the exact pixels and attribution of an image to a key.
//! Signing computes the [`Fingerprint`], has the [`KeyAuthority`] sign it and
//! returns the storage text to embed. Verification recomputes the
//! fingerprint from the image and the *claimed* attribution and checks the
//! embedded signature against it.
//!
//! Verification has three outcomes:
//!
//! - [`VerificationResult::Authentic`] - signature matches pixels, attribution and key
//! - [`VerificationResult::Tampered`] - well-formed signature that does not match
//! - [`VerificationResult::Invalid`] - no usable signature or key to check against
//!
//! Decoding failures of the image itself and backend failures are errors,
//! not outcomes.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::attribution::Attribution;
use crate::authority::{KeyAuthority, KeyIdentity};
use crate::codec;
use crate::embed::EmbeddedFields;
use crate::error::{ErrorKind, ImageIpError, Result};
use crate::fingerprint::Fingerprint;
use crate::pixels::PixelBuffer;

/// Raw signature bytes and their storage text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePacket {
    signature: Vec<u8>,
    storage_text: String,
}

impl SignaturePacket {
    pub fn from_signature(signature: Vec<u8>) -> Self {
        let storage_text = codec::encode(&signature);
        Self {
            signature,
            storage_text,
        }
    }

    /// Parse storage text, with or without a character-code header.
    pub fn from_storage_text(text: &str) -> Result<Self> {
        let signature = codec::decode(text)?;
        Ok(Self::from_signature(signature))
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn storage_text(&self) -> &str {
        &self.storage_text
    }

    pub fn into_storage_text(self) -> String {
        self.storage_text
    }
}

/// Outcome of verifying an image against its claimed attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    Authentic,
    Tampered,
    Invalid(ErrorKind),
}

impl VerificationResult {
    pub fn is_authentic(&self) -> bool {
        matches!(self, Self::Authentic)
    }

    pub fn is_tampered(&self) -> bool {
        matches!(self, Self::Tampered)
    }

    /// Why the signature could not be checked, if it could not.
    pub fn invalid_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Invalid(kind) => Some(*kind),
            Self::Authentic | Self::Tampered => None,
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentic => write!(f, "authentic"),
            Self::Tampered => write!(f, "tampered"),
            Self::Invalid(kind) => write!(f, "invalid ({kind})"),
        }
    }
}

/// Signs and verifies images with keys held by a [`KeyAuthority`].
///
/// Holds no mutable state; share it freely across threads.
#[derive(Clone)]
pub struct SignerVerifier {
    authority: Arc<dyn KeyAuthority>,
}

impl SignerVerifier {
    pub fn new(authority: Arc<dyn KeyAuthority>) -> Self {
        Self { authority }
    }

    pub fn authority(&self) -> &Arc<dyn KeyAuthority> {
        &self.authority
    }

    /// Sign an encoded image, returning storage text for embedding.
    #[cfg(feature = "decode")]
    pub fn sign(
        &self,
        image: &[u8],
        attribution: &Attribution,
        key: &KeyIdentity,
    ) -> Result<String> {
        let pixels = crate::pixels::decode_pixels(image)?;
        self.sign_pixels(&pixels, attribution, key)
    }

    /// Sign decoded pixels, returning storage text for embedding.
    pub fn sign_pixels(
        &self,
        pixels: &PixelBuffer,
        attribution: &Attribution,
        key: &KeyIdentity,
    ) -> Result<String> {
        self.sign_packet(pixels, attribution, key)
            .map(SignaturePacket::into_storage_text)
    }

    /// Sign decoded pixels, keeping the raw signature alongside its text.
    #[instrument(level = "debug", skip_all, fields(key = %key, backend = %self.authority.backend()))]
    pub fn sign_packet(
        &self,
        pixels: &PixelBuffer,
        attribution: &Attribution,
        key: &KeyIdentity,
    ) -> Result<SignaturePacket> {
        let fingerprint = Fingerprint::compute(pixels, attribution)?;

        let signature = self
            .authority
            .ensure_pinned(key)
            .and_then(|()| self.authority.sign(&fingerprint, key))
            .map_err(|e| match e {
                ImageIpError::SigningFailed(_) => e,
                other => ImageIpError::SigningFailed(other.to_string()),
            })?;

        debug!(%fingerprint, signature_len = signature.len(), "Signed fingerprint");
        Ok(SignaturePacket::from_signature(signature))
    }

    /// Verify an encoded image against its claimed attribution.
    #[cfg(feature = "decode")]
    pub fn verify(
        &self,
        image: &[u8],
        claimed: &Attribution,
        storage_text: &str,
        key: &KeyIdentity,
    ) -> Result<VerificationResult> {
        let pixels = crate::pixels::decode_pixels(image)?;
        self.verify_pixels(&pixels, claimed, storage_text, key)
    }

    /// Verify decoded pixels against their claimed attribution.
    #[instrument(level = "debug", skip_all, fields(key = %key, backend = %self.authority.backend()))]
    pub fn verify_pixels(
        &self,
        pixels: &PixelBuffer,
        claimed: &Attribution,
        storage_text: &str,
        key: &KeyIdentity,
    ) -> Result<VerificationResult> {
        let fingerprint = Fingerprint::compute(pixels, claimed)?;

        let packet = match SignaturePacket::from_storage_text(storage_text) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(error = %e, "Unreadable signature text");
                return Ok(VerificationResult::Invalid(e.kind()));
            }
        };

        let checked = self
            .authority
            .ensure_pinned(key)
            .and_then(|()| self.authority.verify(&fingerprint, packet.signature(), key));

        let result = match checked {
            Ok(true) => VerificationResult::Authentic,
            Ok(false) => VerificationResult::Tampered,
            Err(e) => match e.kind() {
                kind @ (ErrorKind::MalformedSignatureEncoding | ErrorKind::KeyUnavailable) => {
                    warn!(error = %e, "Signature could not be checked");
                    VerificationResult::Invalid(kind)
                }
                _ => return Err(e),
            },
        };

        debug!(%fingerprint, %result, "Verified fingerprint");
        Ok(result)
    }

    /// Verify decoded pixels against the attribution and signature recovered
    /// from embedded metadata fields.
    ///
    /// Missing or unreadable fields make the result `Invalid`.
    pub fn verify_embedded(
        &self,
        pixels: &PixelBuffer,
        fields: &EmbeddedFields,
        key: &KeyIdentity,
    ) -> Result<VerificationResult> {
        let recovered = fields
            .attribution()
            .and_then(|attribution| Ok((attribution, fields.signature_text()?)));

        match recovered {
            Ok((attribution, storage_text)) => {
                self.verify_pixels(pixels, &attribution, &storage_text, key)
            }
            Err(e) => {
                debug!(error = %e, "Embedded fields unusable");
                Ok(VerificationResult::Invalid(e.kind()))
            }
        }
    }
}

impl fmt::Debug for SignerVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerVerifier")
            .field("backend", &self.authority.backend())
            .finish()
    }
}
