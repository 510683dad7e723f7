//! ML-DSA-65 (FIPS 204) key pairs shared by the native backends.

use pqcrypto_mldsa::mldsa65;
use pqcrypto_traits::sign::{DetachedSignature, PublicKey, SecretKey};
use sha3::{Digest, Sha3_256};
use zeroize::Zeroizing;

use super::KeyFingerprint;
use crate::error::{ImageIpError, Result};

/// ML-DSA-65 public key size in bytes.
pub const MLDSA65_PUBLIC_KEY_BYTES: usize = 1952;

/// ML-DSA-65 detached signature size in bytes.
pub const MLDSA65_SIGNATURE_BYTES: usize = 3309;

pub(crate) const ALGORITHM: &str = "ML-DSA-65";

/// A public key with an optional private half.
///
/// Keys imported for verification only have no secret. The secret is held as
/// raw bytes that are wiped on drop and only turned into a `SecretKey` for
/// the duration of a signing call.
#[derive(Clone)]
pub(crate) struct MlDsaKeyPair {
    public_key: Vec<u8>,
    secret_key: Option<Zeroizing<Vec<u8>>>,
}

impl MlDsaKeyPair {
    pub(crate) fn generate() -> Self {
        let (public_key, secret_key) = mldsa65::keypair();
        Self {
            public_key: public_key.as_bytes().to_vec(),
            secret_key: Some(Zeroizing::new(secret_key.as_bytes().to_vec())),
        }
    }

    /// Rebuild a key pair from stored bytes, checking both halves parse.
    pub(crate) fn from_parts(public_key: &[u8], secret_key: Option<&[u8]>) -> Result<Self> {
        mldsa65::PublicKey::from_bytes(public_key).map_err(|_| {
            ImageIpError::KeyStore(format!(
                "Invalid {ALGORITHM} public key ({} bytes)",
                public_key.len()
            ))
        })?;

        if let Some(secret) = secret_key {
            mldsa65::SecretKey::from_bytes(secret).map_err(|_| {
                ImageIpError::KeyStore(format!("Invalid {ALGORITHM} secret key"))
            })?;
        }

        Ok(Self {
            public_key: public_key.to_vec(),
            secret_key: secret_key.map(|s| Zeroizing::new(s.to_vec())),
        })
    }

    pub(crate) fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub(crate) fn secret_key(&self) -> Option<&[u8]> {
        self.secret_key.as_deref().map(Vec::as_slice)
    }

    /// SHA3-256 over the public key bytes.
    pub(crate) fn fingerprint(&self) -> KeyFingerprint {
        KeyFingerprint::from_digest(&Sha3_256::digest(&self.public_key))
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let secret = self.secret_key.as_ref().ok_or_else(|| {
            ImageIpError::SigningFailed("Only the public key is available".into())
        })?;
        let secret_key = mldsa65::SecretKey::from_bytes(secret)
            .map_err(|_| ImageIpError::SigningFailed("Invalid secret key".into()))?;

        let signature = mldsa65::detached_sign(message, &secret_key);
        Ok(signature.as_bytes().to_vec())
    }

    pub(crate) fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool> {
        let public_key = mldsa65::PublicKey::from_bytes(&self.public_key).map_err(|_| {
            ImageIpError::VerificationBackendError("Invalid public key".into())
        })?;
        let malformed = || {
            ImageIpError::MalformedSignatureEncoding(format!(
                "Not an {ALGORITHM} signature ({} bytes, expected {MLDSA65_SIGNATURE_BYTES})",
                signature.len()
            ))
        };
        // from_bytes only rejects oversized input
        if signature.len() != MLDSA65_SIGNATURE_BYTES {
            return Err(malformed());
        }
        let signature =
            mldsa65::DetachedSignature::from_bytes(signature).map_err(|_| malformed())?;

        Ok(mldsa65::verify_detached_signature(&signature, message, &public_key).is_ok())
    }
}

impl std::fmt::Debug for MlDsaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlDsaKeyPair")
            .field("fingerprint", &self.fingerprint())
            .field(
                "secret_key",
                &self.secret_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_key_sizes() {
        let pair = MlDsaKeyPair::generate();
        assert_eq!(pair.public_key().len(), MLDSA65_PUBLIC_KEY_BYTES);
        assert_eq!(mldsa65::public_key_bytes(), MLDSA65_PUBLIC_KEY_BYTES);
        assert_eq!(mldsa65::signature_bytes(), MLDSA65_SIGNATURE_BYTES);
    }

    #[test]
    fn test_sign_verify() {
        let pair = MlDsaKeyPair::generate();
        let signature = pair.sign(b"digest").unwrap();
        assert_eq!(signature.len(), MLDSA65_SIGNATURE_BYTES);
        assert!(pair.verify(b"digest", &signature).unwrap());
        assert!(!pair.verify(b"other", &signature).unwrap());
    }

    #[test]
    fn test_wrong_length_signature_is_malformed() {
        let pair = MlDsaKeyPair::generate();
        for len in [0, 3, MLDSA65_SIGNATURE_BYTES - 1, MLDSA65_SIGNATURE_BYTES + 1] {
            let err = pair.verify(b"digest", &vec![7; len]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedSignatureEncoding, "len {len}");
        }
        assert!(!pair
            .verify(b"digest", &[7; MLDSA65_SIGNATURE_BYTES])
            .unwrap());
    }

    #[test]
    fn test_public_only_cannot_sign() {
        let pair = MlDsaKeyPair::generate();
        let public = MlDsaKeyPair::from_parts(pair.public_key(), None).unwrap();
        assert_eq!(
            public.sign(b"digest").unwrap_err().kind(),
            ErrorKind::SigningFailed
        );
        assert_eq!(public.fingerprint(), pair.fingerprint());
    }

    #[test]
    fn test_from_parts_rejects_garbage() {
        let err = MlDsaKeyPair::from_parts(&[0u8; 10], None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyStore);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", MlDsaKeyPair::generate());
        assert!(rendered.contains("[REDACTED]"));
    }
}
