//! Key authorities: asymmetric key generation, signing and verification.
//!
//! The signer never touches key material itself. It selects a key by a
//! [`KeyIdentity`] and delegates every cryptographic operation to a
//! [`KeyAuthority`], so a backend can be swapped without touching the
//! signing protocol.
//!
//! ## Backends
//!
//! - [`KeyStoreAuthority`] - ML-DSA-65 keys in a local key-store directory
//! - [`GpgKeyAuthority`] - RSA keys managed by an external `gpg` binary
//! - [`MemoryKeyAuthority`] - in-process ML-DSA-65 keys for tests
//!
//! ## Trust model
//!
//! Trust is flat: a public key imported into an authority is trusted for
//! every label it was imported under. A [`KeyIdentity`] may additionally be
//! pinned to a [`KeyFingerprint`]; see [`KeyAuthority::ensure_pinned`].

#[cfg(feature = "gpg")]
mod gpg;
mod memory;
mod mldsa;
mod provider;
mod store;

#[cfg(feature = "gpg")]
pub use gpg::{GpgConfig, GpgKeyAuthority, GNUPG_HOME_ENV, GPG_PROGRAM_ENV};
pub use memory::MemoryKeyAuthority;
pub use mldsa::{MLDSA65_PUBLIC_KEY_BYTES, MLDSA65_SIGNATURE_BYTES};
pub use provider::{KeyAuthorityConfig, KeyAuthorityFactory, KEY_AUTHORITY_ENV};
pub use store::{KeyStoreAuthority, KeyStoreConfig, KEY_STORE_ENV};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ImageIpError, Result};
use crate::fingerprint::Fingerprint;

/// Capability surface of a key backend.
///
/// Implementations must be thread-safe (`Send + Sync`). Calls may block on
/// disk or subprocess I/O and carry no internal timeout; a backend may
/// serialise calls internally.
pub trait KeyAuthority: Send + Sync {
    /// Generate a key pair for `label`. Keys have no passphrase and no
    /// expiry. The returned identity is pinned to the new key.
    fn generate(&self, label: &str) -> Result<KeyIdentity>;

    /// Sign a fingerprint with the private key selected by `key`.
    fn sign(&self, fingerprint: &Fingerprint, key: &KeyIdentity) -> Result<Vec<u8>>;

    /// Check `signature` over `fingerprint` against the public key selected
    /// by `key`.
    ///
    /// Returns `Ok(false)` for a well-formed signature that does not match.
    /// Fails with `MalformedSignatureEncoding` when the bytes are not a
    /// signature at all and `KeyUnavailable` when no public key is known.
    fn verify(&self, fingerprint: &Fingerprint, signature: &[u8], key: &KeyIdentity)
        -> Result<bool>;

    /// Whether a key is known for `label`.
    fn exists(&self, label: &str) -> bool;

    /// Fingerprint of the public key registered for `label`.
    fn key_fingerprint(&self, label: &str) -> Result<KeyFingerprint>;

    /// Public key bytes for `label`, suitable for [`KeyAuthority::import_public_key`].
    fn export_public_key(&self, label: &str) -> Result<Vec<u8>>;

    /// Import and trust a public key under `label`.
    fn import_public_key(&self, label: &str, public_key: &[u8]) -> Result<KeyIdentity>;

    fn backend(&self) -> AuthorityBackend;

    /// Fail with `KeyUnavailable` if `key` is pinned to a different key than
    /// the one this authority holds for its label.
    fn ensure_pinned(&self, key: &KeyIdentity) -> Result<()> {
        let Some(pinned) = key.pinned() else {
            return Ok(());
        };

        let actual = self.key_fingerprint(key.label())?;
        if &actual != pinned {
            return Err(ImageIpError::KeyUnavailable(format!(
                "key for '{}' is {actual}, expected pinned {pinned}",
                key.label()
            )));
        }
        Ok(())
    }
}

/// Identifies the backend behind a [`KeyAuthority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityBackend {
    KeyStore,
    Gpg,
    /// In-process keys, lost on drop
    Memory,
}

impl fmt::Display for AuthorityBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyStore => write!(f, "ML-DSA-65 key store"),
            Self::Gpg => write!(f, "GnuPG"),
            Self::Memory => write!(f, "Memory (NOT PERSISTENT)"),
        }
    }
}

/// Uppercase hex fingerprint of a public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyFingerprint(String);

impl KeyFingerprint {
    /// Parse a hex fingerprint, ignoring spaces and case.
    pub fn parse(s: &str) -> Result<Self> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() || !compact.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ImageIpError::KeyUnavailable(format!(
                "'{s}' is not a hex key fingerprint"
            )));
        }
        Ok(Self(compact.to_ascii_uppercase()))
    }

    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode_upper(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KeyFingerprint {
    type Error = ImageIpError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<KeyFingerprint> for String {
    fn from(fingerprint: KeyFingerprint) -> Self {
        fingerprint.0
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selects a key inside an authority.
///
/// The label is usually an email address. A pinned fingerprint makes the
/// signer refuse any other key registered under the same label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyIdentity {
    label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pinned: Option<KeyFingerprint>,
}

impl KeyIdentity {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pinned: None,
        }
    }

    /// Pin this identity to a specific public key.
    pub fn pinned_to(mut self, fingerprint: KeyFingerprint) -> Self {
        self.pinned = Some(fingerprint);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pinned(&self) -> Option<&KeyFingerprint> {
        self.pinned.as_ref()
    }
}

impl fmt::Display for KeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pinned {
            Some(fingerprint) => write!(f, "{} ({fingerprint})", self.label),
            None => f.write_str(&self.label),
        }
    }
}

/// Labels end up in file names and subprocess arguments.
pub(crate) fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() || label.chars().any(char::is_control) {
        return Err(ImageIpError::KeyUnavailable(format!(
            "invalid key label {label:?}"
        )));
    }
    Ok(())
}
