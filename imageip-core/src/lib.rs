//! ImageIP Core - tamper-evident attribution for still images
//!
//! This crate binds an image's pixels and its attribution (author, copyright
//! holder, license, year) to a signing key. Any change to a pixel or to the
//! claimed attribution makes verification report the image as tampered.
//!
//! # Features
//!
//! - SHA3-256 fingerprints over canonical RGB8 pixels and attribution
//! - Pluggable key authorities: ML-DSA-65 (FIPS 204) key store, GnuPG, in-memory
//! - Base-64 storage text with EXIF user-comment framing
//! - Metadata field layout for embedding attribution alongside the signature
//! - Secret key zeroization on drop
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use imageip_core::{Attribution, License, MemoryKeyAuthority, KeyAuthority, PixelBuffer, SignerVerifier};
//!
//! # fn example() -> imageip_core::Result<()> {
//! // In production, use KeyStoreAuthority or GpgKeyAuthority
//! let authority = Arc::new(MemoryKeyAuthority::new());
//! let key = authority.generate("alice@example.com")?;
//! let signer = SignerVerifier::new(authority);
//!
//! let pixels = PixelBuffer::rgb(2, 2, [255, 0, 0].repeat(4))?;
//! let attribution = Attribution::new("Alice", "Alice Ltd", License::CcBy, 2024);
//!
//! // Sign, then embed the returned text in the image's user comment
//! let text = signer.sign_pixels(&pixels, &attribution, &key)?;
//!
//! let result = signer.verify_pixels(&pixels, &attribution, &text, &key)?;
//! assert!(result.is_authentic());
//! # Ok(())
//! # }
//! ```

pub mod attribution;
pub mod authority;
pub mod codec;
pub mod embed;
pub mod error;
pub mod fingerprint;
pub mod pixels;
pub mod signer;

// Re-export main types for convenience
pub use attribution::{creation_year, file_creation_year, Attribution, License};
pub use authority::{
    AuthorityBackend, KeyAuthority, KeyAuthorityConfig, KeyAuthorityFactory, KeyFingerprint,
    KeyIdentity, KeyStoreAuthority, KeyStoreConfig, MemoryKeyAuthority,
};
pub use codec::CharacterCode;
pub use embed::EmbeddedFields;
pub use error::{ErrorKind, ImageIpError, Result};
pub use fingerprint::{Fingerprint, FINGERPRINT_SIZE};
pub use pixels::{ImageClass, PixelBuffer};
pub use signer::{SignaturePacket, SignerVerifier, VerificationResult};

// GnuPG backend (subprocess, not available without a gpg binary)
#[cfg(feature = "gpg")]
pub use authority::{GpgConfig, GpgKeyAuthority};

#[cfg(feature = "decode")]
pub use pixels::{decode_image, decode_pixels};
