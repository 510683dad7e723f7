//! In-process key authority for tests.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use super::mldsa::MlDsaKeyPair;
use super::{validate_label, AuthorityBackend, KeyAuthority, KeyFingerprint, KeyIdentity};
use crate::error::{ImageIpError, Result};
use crate::fingerprint::Fingerprint;

/// ML-DSA-65 keys held in memory.
/// WARNING: keys are lost when the authority is dropped.
#[derive(Debug, Default)]
pub struct MemoryKeyAuthority {
    keys: RwLock<HashMap<String, MlDsaKeyPair>>,
}

impl MemoryKeyAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_key<T>(&self, label: &str, f: impl FnOnce(&MlDsaKeyPair) -> Result<T>) -> Result<T> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        let pair = keys
            .get(label)
            .ok_or_else(|| ImageIpError::KeyUnavailable(format!("No key for '{label}'")))?;
        f(pair)
    }

    fn insert(&self, label: &str, pair: MlDsaKeyPair) -> Result<KeyIdentity> {
        validate_label(label)?;
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        if keys.get(label).is_some_and(|existing| existing.secret_key().is_some()) {
            return Err(ImageIpError::KeyStore(format!(
                "A private key for '{label}' already exists"
            )));
        }

        let fingerprint = pair.fingerprint();
        keys.insert(label.to_string(), pair);
        debug!(label, %fingerprint, "Stored key in memory");
        Ok(KeyIdentity::new(label).pinned_to(fingerprint))
    }
}

impl KeyAuthority for MemoryKeyAuthority {
    fn generate(&self, label: &str) -> Result<KeyIdentity> {
        self.insert(label, MlDsaKeyPair::generate())
    }

    fn sign(&self, fingerprint: &Fingerprint, key: &KeyIdentity) -> Result<Vec<u8>> {
        self.with_key(key.label(), |pair| pair.sign(fingerprint.as_ref()))
            .map_err(|e| match e {
                ImageIpError::KeyUnavailable(msg) => ImageIpError::SigningFailed(msg),
                other => other,
            })
    }

    fn verify(
        &self,
        fingerprint: &Fingerprint,
        signature: &[u8],
        key: &KeyIdentity,
    ) -> Result<bool> {
        self.with_key(key.label(), |pair| pair.verify(fingerprint.as_ref(), signature))
    }

    fn exists(&self, label: &str) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(label)
    }

    fn key_fingerprint(&self, label: &str) -> Result<KeyFingerprint> {
        self.with_key(label, |pair| Ok(pair.fingerprint()))
    }

    fn export_public_key(&self, label: &str) -> Result<Vec<u8>> {
        self.with_key(label, |pair| Ok(pair.public_key().to_vec()))
    }

    fn import_public_key(&self, label: &str, public_key: &[u8]) -> Result<KeyIdentity> {
        self.insert(label, MlDsaKeyPair::from_parts(public_key, None)?)
    }

    fn backend(&self) -> AuthorityBackend {
        AuthorityBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn digest(byte: u8) -> Fingerprint {
        Fingerprint::from_bytes([byte; 32])
    }

    #[test]
    fn test_generate_sign_verify() {
        let authority = MemoryKeyAuthority::new();
        let key = authority.generate("alice@example.com").unwrap();
        assert!(authority.exists("alice@example.com"));
        assert!(key.pinned().is_some());

        let signature = authority.sign(&digest(1), &key).unwrap();
        assert!(authority.verify(&digest(1), &signature, &key).unwrap());
        assert!(!authority.verify(&digest(2), &signature, &key).unwrap());
    }

    #[test]
    fn test_missing_key() {
        let authority = MemoryKeyAuthority::new();
        let key = KeyIdentity::new("nobody@example.com");
        assert!(!authority.exists("nobody@example.com"));
        assert_eq!(
            authority.sign(&digest(1), &key).unwrap_err().kind(),
            ErrorKind::SigningFailed
        );
        assert_eq!(
            authority.verify(&digest(1), &[0; 8], &key).unwrap_err().kind(),
            ErrorKind::KeyUnavailable
        );
    }

    #[test]
    fn test_generate_twice_rejected() {
        let authority = MemoryKeyAuthority::new();
        authority.generate("a@b").unwrap();
        assert_eq!(
            authority.generate("a@b").unwrap_err().kind(),
            ErrorKind::KeyStore
        );
    }

    #[test]
    fn test_export_import_trusts_key() {
        let signer = MemoryKeyAuthority::new();
        let key = signer.generate("a@b").unwrap();
        let signature = signer.sign(&digest(9), &key).unwrap();

        let verifier = MemoryKeyAuthority::new();
        let imported = verifier
            .import_public_key("a@b", &signer.export_public_key("a@b").unwrap())
            .unwrap();
        assert_eq!(imported, key);
        assert!(verifier.verify(&digest(9), &signature, &imported).unwrap());
        assert_eq!(
            verifier.sign(&digest(9), &imported).unwrap_err().kind(),
            ErrorKind::SigningFailed
        );
    }

    #[test]
    fn test_ensure_pinned() {
        let authority = MemoryKeyAuthority::new();
        let key = authority.generate("a@b").unwrap();
        assert!(authority.ensure_pinned(&key).is_ok());
        assert!(authority.ensure_pinned(&KeyIdentity::new("a@b")).is_ok());

        let wrong = KeyIdentity::new("a@b").pinned_to(KeyFingerprint::parse("00").unwrap());
        assert_eq!(
            authority.ensure_pinned(&wrong).unwrap_err().kind(),
            ErrorKind::KeyUnavailable
        );
    }
}
