//! Backend selection for key authorities.

use std::sync::Arc;

#[cfg(feature = "gpg")]
use super::{GpgConfig, GpgKeyAuthority};
use super::{KeyAuthority, KeyStoreAuthority, KeyStoreConfig, MemoryKeyAuthority};
use crate::error::{ImageIpError, Result};

/// Environment variable naming the backend for [`KeyAuthorityConfig::Auto`].
pub const KEY_AUTHORITY_ENV: &str = "IMAGEIP_KEY_AUTHORITY";

/// Configuration for creating key authorities.
#[derive(Debug, Clone, Default)]
pub enum KeyAuthorityConfig {
    /// ML-DSA-65 keys in a local directory
    KeyStore(KeyStoreConfig),

    /// RSA keys managed by GnuPG
    #[cfg(feature = "gpg")]
    Gpg(GpgConfig),

    /// In-process keys (testing only)
    Memory,

    /// Select from the environment
    #[default]
    Auto,
}

/// Factory for creating key authorities.
pub struct KeyAuthorityFactory;

impl KeyAuthorityFactory {
    /// Create a key authority from configuration.
    pub fn create(config: KeyAuthorityConfig) -> Result<Arc<dyn KeyAuthority>> {
        match config {
            KeyAuthorityConfig::KeyStore(store_config) => {
                Ok(Arc::new(KeyStoreAuthority::new(store_config)))
            }
            #[cfg(feature = "gpg")]
            KeyAuthorityConfig::Gpg(gpg_config) => Ok(Arc::new(GpgKeyAuthority::new(gpg_config))),
            KeyAuthorityConfig::Memory => Ok(Self::create_memory()),
            KeyAuthorityConfig::Auto => Self::create_auto(),
        }
    }

    /// Select a backend from `IMAGEIP_KEY_AUTHORITY`.
    ///
    /// - `gpg` - GnuPG, configured by [`GpgConfig::from_env`]
    /// - `memory` - in-process keys
    /// - `keystore` or unset - local key store, configured by
    ///   [`KeyStoreConfig::from_env`]
    fn create_auto() -> Result<Arc<dyn KeyAuthority>> {
        let choice = std::env::var(KEY_AUTHORITY_ENV)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match choice.as_str() {
            #[cfg(feature = "gpg")]
            "gpg" | "gnupg" => {
                tracing::info!("Auto-selected GnuPG key authority");
                Self::create(KeyAuthorityConfig::Gpg(GpgConfig::from_env()?))
            }
            "memory" => {
                tracing::warn!("Auto-selected in-memory key authority; keys will not persist");
                Ok(Self::create_memory())
            }
            "" | "keystore" | "key-store" => {
                let store_config = KeyStoreConfig::from_env()?;
                tracing::info!(location = %store_config.location.display(), "Auto-selected key store authority");
                Self::create(KeyAuthorityConfig::KeyStore(store_config))
            }
            other => Err(ImageIpError::Config(format!(
                "Unknown {KEY_AUTHORITY_ENV} value '{other}'"
            ))),
        }
    }

    /// Create an in-memory authority for testing.
    pub fn create_memory() -> Arc<dyn KeyAuthority> {
        Arc::new(MemoryKeyAuthority::new())
    }
}
