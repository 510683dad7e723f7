//! ML-DSA-65 key authority backed by a key-store directory.
//!
//! Each label maps to one CBOR file named after the SHA3-256 of the label,
//! so arbitrary labels (email addresses, names with spaces) are safe on
//! every filesystem. The file records the label, algorithm, creation time
//! and key bytes; the private half is absent for imported public keys.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use tracing::{debug, info, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::mldsa::{MlDsaKeyPair, ALGORITHM};
use super::{validate_label, AuthorityBackend, KeyAuthority, KeyFingerprint, KeyIdentity};
use crate::error::{ImageIpError, Result};
use crate::fingerprint::Fingerprint;

/// Environment variable naming the key-store directory.
pub const KEY_STORE_ENV: &str = "IMAGEIP_KEY_STORE";

const KEY_FILE_EXTENSION: &str = "key";

/// Location of a key store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyStoreConfig {
    /// Directory holding one file per key
    pub location: PathBuf,
}

impl KeyStoreConfig {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Uses `IMAGEIP_KEY_STORE` if set, otherwise `$HOME/.imageip/keys`.
    pub fn from_env() -> Result<Self> {
        if let Ok(location) = std::env::var(KEY_STORE_ENV) {
            return Ok(Self::new(location));
        }

        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .ok_or_else(|| {
                ImageIpError::Config(format!(
                    "{KEY_STORE_ENV} is not set and no home directory is known"
                ))
            })?;

        Ok(Self::new(PathBuf::from(home).join(".imageip").join("keys")))
    }
}

/// On-disk key record.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredKey {
    label: String,
    algorithm: String,
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
    public_key: Vec<u8>,
    secret_key: Option<Vec<u8>>,
}

/// Key authority persisting ML-DSA-65 keys under [`KeyStoreConfig::location`].
pub struct KeyStoreAuthority {
    config: KeyStoreConfig,
    write_lock: Mutex<()>,
}

impl KeyStoreAuthority {
    /// Open a key store. The directory is created on first write.
    pub fn new(config: KeyStoreConfig) -> Self {
        debug!(location = %config.location.display(), "Opening key store");
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn location(&self) -> &Path {
        &self.config.location
    }

    fn key_path(&self, label: &str) -> PathBuf {
        let digest = Sha3_256::digest(label.as_bytes());
        self.config
            .location
            .join(format!("{}.{KEY_FILE_EXTENSION}", hex::encode(&digest[..16])))
    }

    fn load(&self, label: &str) -> Result<MlDsaKeyPair> {
        validate_label(label)?;
        let path = self.key_path(label);
        let bytes = match fs::read(&path) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ImageIpError::KeyUnavailable(format!("No key for '{label}'")));
            }
            Err(e) => {
                return Err(ImageIpError::KeyStore(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let stored: StoredKey = ciborium::from_reader(bytes.as_slice()).map_err(|e| {
            ImageIpError::KeyStore(format!("Corrupt key file {}: {e}", path.display()))
        })?;

        if stored.label != label {
            return Err(ImageIpError::KeyStore(format!(
                "Key file {} belongs to '{}'",
                path.display(),
                stored.label
            )));
        }
        if stored.algorithm != ALGORITHM {
            return Err(ImageIpError::KeyStore(format!(
                "Unsupported key algorithm {}",
                stored.algorithm
            )));
        }

        MlDsaKeyPair::from_parts(&stored.public_key, stored.secret_key.as_deref())
    }

    #[instrument(level = "debug", skip(self, pair), fields(location = %self.config.location.display()))]
    fn store(&self, label: &str, pair: &MlDsaKeyPair) -> Result<KeyIdentity> {
        validate_label(label)?;
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.key_path(label);
        match self.load(label) {
            Ok(existing) if existing.secret_key().is_some() => {
                return Err(ImageIpError::KeyStore(format!(
                    "A private key for '{label}' already exists"
                )));
            }
            Ok(_) => warn!(label, "Replacing imported public key"),
            Err(ImageIpError::KeyUnavailable(_)) => {}
            Err(e) => return Err(e),
        }

        let stored = StoredKey {
            label: label.to_string(),
            algorithm: ALGORITHM.to_string(),
            created_at: Utc::now(),
            public_key: pair.public_key().to_vec(),
            secret_key: pair.secret_key().map(<[u8]>::to_vec),
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&stored, &mut bytes)
            .map_err(|e| ImageIpError::KeyStore(format!("Failed to serialize key: {e}")))?;

        let result = write_private_file(&self.config.location, &path, &bytes);
        bytes.zeroize();
        result?;

        let fingerprint = pair.fingerprint();
        info!(label, %fingerprint, path = %path.display(), "Key stored");
        Ok(KeyIdentity::new(label).pinned_to(fingerprint))
    }
}

impl std::fmt::Debug for KeyStoreAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStoreAuthority")
            .field("location", &self.config.location)
            .finish()
    }
}

impl KeyAuthority for KeyStoreAuthority {
    fn generate(&self, label: &str) -> Result<KeyIdentity> {
        self.store(label, &MlDsaKeyPair::generate())
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    fn sign(&self, fingerprint: &Fingerprint, key: &KeyIdentity) -> Result<Vec<u8>> {
        let pair = self.load(key.label()).map_err(|e| match e {
            ImageIpError::KeyUnavailable(msg) => ImageIpError::SigningFailed(msg),
            other => other,
        })?;
        pair.sign(fingerprint.as_ref())
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    fn verify(
        &self,
        fingerprint: &Fingerprint,
        signature: &[u8],
        key: &KeyIdentity,
    ) -> Result<bool> {
        self.load(key.label())?.verify(fingerprint.as_ref(), signature)
    }

    fn exists(&self, label: &str) -> bool {
        validate_label(label).is_ok() && self.key_path(label).is_file()
    }

    fn key_fingerprint(&self, label: &str) -> Result<KeyFingerprint> {
        Ok(self.load(label)?.fingerprint())
    }

    fn export_public_key(&self, label: &str) -> Result<Vec<u8>> {
        Ok(self.load(label)?.public_key().to_vec())
    }

    fn import_public_key(&self, label: &str, public_key: &[u8]) -> Result<KeyIdentity> {
        let pair = MlDsaKeyPair::from_parts(public_key, None)?;
        self.store(label, &pair)
    }

    fn backend(&self) -> AuthorityBackend {
        AuthorityBackend::KeyStore
    }
}

/// Write `bytes` to `path` via a sibling temp file, owner-only on Unix.
fn write_private_file(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |what: &str, e: std::io::Error| {
        ImageIpError::KeyStore(format!("Failed to {what} {}: {e}", path.display()))
    };

    fs::create_dir_all(dir).map_err(|e| io_err("create key store for", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
            .map_err(|e| io_err("restrict key store for", e))?;
    }

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).map_err(|e| io_err("write", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))
            .map_err(|e| io_err("restrict", e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_err("write", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;

    fn digest() -> Fingerprint {
        Fingerprint::from_bytes([7; 32])
    }

    #[test]
    fn test_keys_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let config = KeyStoreConfig::new(dir.path().join("keys"));

        let key = KeyStoreAuthority::new(config.clone())
            .generate("alice@example.com")
            .unwrap();

        let reopened = KeyStoreAuthority::new(config);
        assert!(reopened.exists("alice@example.com"));
        assert!(reopened.ensure_pinned(&key).is_ok());

        let signature = reopened.sign(&digest(), &key).unwrap();
        assert!(reopened.verify(&digest(), &signature, &key).unwrap());
    }

    #[test]
    fn test_missing_key_kinds() {
        let dir = TempDir::new().unwrap();
        let authority = KeyStoreAuthority::new(KeyStoreConfig::new(dir.path()));
        let key = KeyIdentity::new("ghost@example.com");

        assert!(!authority.exists("ghost@example.com"));
        assert_eq!(
            authority.sign(&digest(), &key).unwrap_err().kind(),
            ErrorKind::SigningFailed
        );
        assert_eq!(
            authority.verify(&digest(), &[0; 4], &key).unwrap_err().kind(),
            ErrorKind::KeyUnavailable
        );
    }

    #[test]
    fn test_duplicate_generate_rejected() {
        let dir = TempDir::new().unwrap();
        let authority = KeyStoreAuthority::new(KeyStoreConfig::new(dir.path()));
        authority.generate("a@b").unwrap();
        assert_eq!(
            authority.generate("a@b").unwrap_err().kind(),
            ErrorKind::KeyStore
        );
    }

    #[test]
    fn test_import_public_key_between_stores() {
        let signer_dir = TempDir::new().unwrap();
        let verifier_dir = TempDir::new().unwrap();
        let signer = KeyStoreAuthority::new(KeyStoreConfig::new(signer_dir.path()));
        let verifier = KeyStoreAuthority::new(KeyStoreConfig::new(verifier_dir.path()));

        let key = signer.generate("a@b").unwrap();
        let signature = signer.sign(&digest(), &key).unwrap();

        let public_key = signer.export_public_key("a@b").unwrap();
        let imported = verifier.import_public_key("a@b", &public_key).unwrap();
        assert_eq!(imported.pinned(), key.pinned());
        assert!(verifier.verify(&digest(), &signature, &imported).unwrap());
        assert_eq!(
            verifier.sign(&digest(), &imported).unwrap_err().kind(),
            ErrorKind::SigningFailed
        );
    }

    #[test]
    fn test_corrupt_key_file() {
        let dir = TempDir::new().unwrap();
        let authority = KeyStoreAuthority::new(KeyStoreConfig::new(dir.path()));
        fs::write(authority.key_path("a@b"), b"not cbor").unwrap();
        assert_eq!(
            authority.key_fingerprint("a@b").unwrap_err().kind(),
            ErrorKind::KeyStore
        );
    }

    #[test]
    fn test_corrupt_key_file_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let authority = KeyStoreAuthority::new(KeyStoreConfig::new(dir.path()));
        let path = authority.key_path("a@b");
        fs::write(&path, b"not cbor").unwrap();

        assert_eq!(
            authority.generate("a@b").unwrap_err().kind(),
            ErrorKind::KeyStore
        );
        let public_key = MlDsaKeyPair::generate().public_key().to_vec();
        assert_eq!(
            authority
                .import_public_key("a@b", &public_key)
                .unwrap_err()
                .kind(),
            ErrorKind::KeyStore
        );
        assert_eq!(fs::read(&path).unwrap(), b"not cbor");
    }

    #[test]
    fn test_imported_public_key_can_be_replaced() {
        let dir = TempDir::new().unwrap();
        let authority = KeyStoreAuthority::new(KeyStoreConfig::new(dir.path()));
        let first = MlDsaKeyPair::generate();
        let second = MlDsaKeyPair::generate();

        authority.import_public_key("a@b", first.public_key()).unwrap();
        let replaced = authority.import_public_key("a@b", second.public_key()).unwrap();
        assert_eq!(replaced.pinned(), Some(&second.fingerprint()));
    }

    #[test]
    fn test_key_file_names_are_hashed() {
        let dir = TempDir::new().unwrap();
        let authority = KeyStoreAuthority::new(KeyStoreConfig::new(dir.path()));
        let path = authority.key_path("../../etc/passwd");
        assert_eq!(path.parent(), Some(dir.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("key"));
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let authority = KeyStoreAuthority::new(KeyStoreConfig::new(dir.path().join("ks")));
        authority.generate("a@b").unwrap();
        let mode = fs::metadata(authority.key_path("a@b"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
