//! Key authority delegating to an external GnuPG binary.
//!
//! Every operation runs `gpg` non-interactively against an explicit
//! `--homedir`, so the key ring in use is always the configured one and never
//! whatever the process environment happens to point at. Keys are RSA-2048
//! with no passphrase and no expiry; the trust model is `always`, so any
//! imported public key is accepted for verification.
//!
//! Verification reads the machine-readable `--status-fd` stream rather than
//! exit codes, which lets a bad signature (content changed) be told apart
//! from a missing key or unreadable signature data.

use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, instrument, warn};

use super::{validate_label, AuthorityBackend, KeyAuthority, KeyFingerprint, KeyIdentity};
use crate::error::{ImageIpError, Result};
use crate::fingerprint::Fingerprint;

/// Environment variable overriding the `gpg` executable.
pub const GPG_PROGRAM_ENV: &str = "IMAGEIP_GPG_PROGRAM";

/// Standard GnuPG home directory variable.
pub const GNUPG_HOME_ENV: &str = "GNUPGHOME";

/// Configuration for the GnuPG backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpgConfig {
    /// Executable to run (default: `gpg` from `PATH`)
    pub program: PathBuf,
    /// Key-ring directory passed as `--homedir`
    pub home: PathBuf,
    /// RSA modulus size for generated keys (default: 2048)
    pub key_length: u32,
}

impl GpgConfig {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("gpg"),
            home: home.into(),
            key_length: 2048,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Home: `GNUPGHOME`, otherwise `$HOME/.gnupg`.
    /// Program: `IMAGEIP_GPG_PROGRAM`, otherwise `gpg`.
    pub fn from_env() -> Result<Self> {
        let home = match std::env::var_os(GNUPG_HOME_ENV) {
            Some(home) => PathBuf::from(home),
            None => std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(|home| PathBuf::from(home).join(".gnupg"))
                .ok_or_else(|| {
                    ImageIpError::Config(format!(
                        "{GNUPG_HOME_ENV} is not set and no home directory is known"
                    ))
                })?,
        };

        let mut config = Self::new(home);
        if let Some(program) = std::env::var_os(GPG_PROGRAM_ENV) {
            config.program = PathBuf::from(program);
        }
        Ok(config)
    }
}

/// Outcome of `gpg --verify`, read from its status lines.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GpgVerdict {
    /// Signature valid; carries the primary key fingerprint when reported.
    Good { primary_fingerprint: Option<String> },
    Bad,
    NoPublicKey,
    NoData,
    Error(String),
}

/// Interpret `--status-fd` output. A definite verdict (`BADSIG`,
/// `NO_PUBKEY`, `NODATA`) wins over anything else; `GOODSIG` alone is
/// enough for a good verdict.
fn parse_status(status: &str) -> GpgVerdict {
    let mut good = false;
    let mut primary_fingerprint = None;
    let mut error = None;

    for line in status.lines() {
        let Some(rest) = line.strip_prefix("[GNUPG:] ") else {
            continue;
        };
        let mut tokens = rest.split_whitespace();
        match tokens.next() {
            Some("BADSIG") => return GpgVerdict::Bad,
            Some("NO_PUBKEY") => return GpgVerdict::NoPublicKey,
            Some("NODATA") => return GpgVerdict::NoData,
            Some("GOODSIG") => good = true,
            Some("VALIDSIG") => {
                // VALIDSIG <fpr> <date> <ts> <expire> <ver> <rsv> <algo> <hash> <class> <primary-fpr>
                let args: Vec<&str> = tokens.collect();
                primary_fingerprint = args.get(9).or_else(|| args.first()).map(|s| s.to_string());
            }
            Some("ERRSIG") => error = Some(rest.to_string()),
            _ => {}
        }
    }

    match (good, error) {
        (true, _) => GpgVerdict::Good {
            primary_fingerprint,
        },
        (false, Some(error)) => GpgVerdict::Error(error),
        (false, None) => GpgVerdict::Error("gpg reported no signature status".into()),
    }
}

/// First primary-key fingerprint in `--with-colons` listing output.
fn parse_primary_fingerprint(listing: &str) -> Option<String> {
    let mut in_primary = false;
    for line in listing.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields.first().copied() {
            Some("pub") | Some("sec") => in_primary = true,
            Some("sub") | Some("ssb") => in_primary = false,
            Some("fpr") if in_primary => {
                return fields.get(9).filter(|f| !f.is_empty()).map(|f| f.to_string());
            }
            _ => {}
        }
    }
    None
}

/// Key-ring selector: exact email match for email labels.
fn selector(label: &str) -> String {
    if label.contains('@') && !label.starts_with('<') {
        format!("<{label}>")
    } else {
        label.to_string()
    }
}

/// GnuPG subprocess backend. Calls are serialised, since concurrent `gpg`
/// processes contend for the same key-ring lock.
pub struct GpgKeyAuthority {
    config: GpgConfig,
    lock: Mutex<()>,
}

impl GpgKeyAuthority {
    pub fn new(config: GpgConfig) -> Self {
        debug!(home = %config.home.display(), program = %config.program.display(), "Using GnuPG backend");
        Self {
            config,
            lock: Mutex::new(()),
        }
    }

    fn run<I, S>(&self, args: I, input: &[u8]) -> std::io::Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut child = Command::new(&self.config.program)
            .arg("--homedir")
            .arg(&self.config.home)
            .args([
                "--batch",
                "--no-tty",
                "--yes",
                "--quiet",
                "--pinentry-mode",
                "loopback",
                "--trust-model",
                "always",
            ])
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input)?;
        }
        child.wait_with_output()
    }

    fn ensure_home(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config.home).map_err(|e| {
            ImageIpError::KeyStore(format!(
                "Failed to create {}: {e}",
                self.config.home.display()
            ))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.config.home, std::fs::Permissions::from_mode(0o700))
                .map_err(|e| ImageIpError::KeyStore(format!("Failed to restrict GnuPG home: {e}")))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for GpgKeyAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpgKeyAuthority")
            .field("config", &self.config)
            .finish()
    }
}

impl KeyAuthority for GpgKeyAuthority {
    #[instrument(level = "debug", skip(self))]
    fn generate(&self, label: &str) -> Result<KeyIdentity> {
        validate_label(label)?;
        if self.exists(label) {
            return Err(ImageIpError::KeyStore(format!(
                "A key for '{label}' already exists"
            )));
        }
        self.ensure_home()?;

        let name = label.split('@').next().unwrap_or(label);
        let params = format!(
            "Key-Type: RSA\n\
             Key-Length: {len}\n\
             Subkey-Type: RSA\n\
             Subkey-Length: {len}\n\
             Name-Real: {name}\n\
             Name-Email: {label}\n\
             Expire-Date: 0\n\
             %no-protection\n\
             %commit\n",
            len = self.config.key_length,
        );

        let output = self
            .run(["--gen-key"], params.as_bytes())
            .map_err(|e| ImageIpError::KeyStore(format!("Failed to run gpg: {e}")))?;
        if !output.status.success() {
            return Err(ImageIpError::KeyStore(format!(
                "gpg key generation failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let fingerprint = self.key_fingerprint(label)?;
        info!(label, %fingerprint, "Generated GnuPG key");
        Ok(KeyIdentity::new(label).pinned_to(fingerprint))
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    fn sign(&self, fingerprint: &Fingerprint, key: &KeyIdentity) -> Result<Vec<u8>> {
        validate_label(key.label()).map_err(|e| ImageIpError::SigningFailed(e.to_string()))?;

        let output = self
            .run(
                ["--local-user", selector(key.label()).as_str(), "--detach-sign"],
                fingerprint.as_ref(),
            )
            .map_err(|e| ImageIpError::SigningFailed(format!("Failed to run gpg: {e}")))?;

        if !output.status.success() || output.stdout.is_empty() {
            return Err(ImageIpError::SigningFailed(format!(
                "gpg signing failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    #[instrument(level = "debug", skip_all, fields(key = %key))]
    fn verify(
        &self,
        fingerprint: &Fingerprint,
        signature: &[u8],
        key: &KeyIdentity,
    ) -> Result<bool> {
        let expected = self.key_fingerprint(key.label())?;

        let mut signature_file = tempfile::NamedTempFile::new().map_err(|e| {
            ImageIpError::VerificationBackendError(format!("Failed to create temp file: {e}"))
        })?;
        signature_file
            .write_all(signature)
            .and_then(|()| signature_file.flush())
            .map_err(|e| {
                ImageIpError::VerificationBackendError(format!("Failed to write signature: {e}"))
            })?;

        let output = self
            .run(
                [
                    OsStr::new("--status-fd"),
                    OsStr::new("1"),
                    OsStr::new("--verify"),
                    signature_file.path().as_os_str(),
                    OsStr::new("-"),
                ],
                fingerprint.as_ref(),
            )
            .map_err(|e| {
                ImageIpError::VerificationBackendError(format!("Failed to run gpg: {e}"))
            })?;

        match parse_status(&String::from_utf8_lossy(&output.stdout)) {
            GpgVerdict::Good {
                primary_fingerprint,
            } => {
                let signer = primary_fingerprint
                    .as_deref()
                    .map(KeyFingerprint::parse)
                    .transpose()?;
                if signer.as_ref().is_some_and(|signer| signer != &expected) {
                    warn!(expected = %expected, "Signature made by a different key");
                    return Ok(false);
                }
                Ok(true)
            }
            GpgVerdict::Bad => Ok(false),
            GpgVerdict::NoPublicKey => Err(ImageIpError::KeyUnavailable(format!(
                "Public key for '{}' not in key ring",
                key.label()
            ))),
            GpgVerdict::NoData => Err(ImageIpError::MalformedSignatureEncoding(
                "Not an OpenPGP signature".into(),
            )),
            GpgVerdict::Error(status) => Err(ImageIpError::VerificationBackendError(format!(
                "gpg verification error: {status}"
            ))),
        }
    }

    fn exists(&self, label: &str) -> bool {
        self.key_fingerprint(label).is_ok()
    }

    fn key_fingerprint(&self, label: &str) -> Result<KeyFingerprint> {
        validate_label(label)?;
        let output = self
            .run(
                ["--with-colons", "--fingerprint", "--list-keys", selector(label).as_str()],
                &[],
            )
            .map_err(|e| ImageIpError::KeyUnavailable(format!("Failed to run gpg: {e}")))?;

        if !output.status.success() {
            return Err(ImageIpError::KeyUnavailable(format!(
                "No key for '{label}'"
            )));
        }

        parse_primary_fingerprint(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| ImageIpError::KeyUnavailable(format!("No key for '{label}'")))
            .and_then(|fpr| KeyFingerprint::parse(&fpr))
    }

    fn export_public_key(&self, label: &str) -> Result<Vec<u8>> {
        validate_label(label)?;
        let output = self
            .run(["--armor", "--export", selector(label).as_str()], &[])
            .map_err(|e| ImageIpError::KeyStore(format!("Failed to run gpg: {e}")))?;

        let armored = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || !armored.contains("BEGIN PGP PUBLIC KEY BLOCK") {
            return Err(ImageIpError::KeyUnavailable(format!(
                "No exportable public key for '{label}'"
            )));
        }
        Ok(output.stdout)
    }

    fn import_public_key(&self, label: &str, public_key: &[u8]) -> Result<KeyIdentity> {
        validate_label(label)?;
        self.ensure_home()?;

        let output = self
            .run(["--import"], public_key)
            .map_err(|e| ImageIpError::KeyStore(format!("Failed to run gpg: {e}")))?;
        if !output.status.success() {
            return Err(ImageIpError::KeyStore(format!(
                "gpg import failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let fingerprint = self.key_fingerprint(label)?;
        Ok(KeyIdentity::new(label).pinned_to(fingerprint))
    }

    fn backend(&self) -> AuthorityBackend {
        AuthorityBackend::Gpg
    }
}
