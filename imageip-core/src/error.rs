use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageIpError {
    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("Malformed signature encoding: {0}")]
    MalformedSignatureEncoding(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Verification backend error: {0}")]
    VerificationBackendError(String),

    #[error("Key store error: {0}")]
    KeyStore(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid attribution: {0}")]
    InvalidAttribution(String),
}

/// Observable failure category, independent of the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedPixelFormat,
    UnsupportedImageFormat,
    MalformedSignatureEncoding,
    SigningFailed,
    KeyUnavailable,
    VerificationBackendError,
    KeyStore,
    Config,
    InvalidAttribution,
}

impl ImageIpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedPixelFormat(_) => ErrorKind::UnsupportedPixelFormat,
            Self::UnsupportedImageFormat(_) => ErrorKind::UnsupportedImageFormat,
            Self::MalformedSignatureEncoding(_) => ErrorKind::MalformedSignatureEncoding,
            Self::SigningFailed(_) => ErrorKind::SigningFailed,
            Self::KeyUnavailable(_) => ErrorKind::KeyUnavailable,
            Self::VerificationBackendError(_) => ErrorKind::VerificationBackendError,
            Self::KeyStore(_) => ErrorKind::KeyStore,
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidAttribution(_) => ErrorKind::InvalidAttribution,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UnsupportedPixelFormat => "UnsupportedPixelFormat",
            Self::UnsupportedImageFormat => "UnsupportedImageFormat",
            Self::MalformedSignatureEncoding => "MalformedSignatureEncoding",
            Self::SigningFailed => "SigningFailed",
            Self::KeyUnavailable => "KeyUnavailable",
            Self::VerificationBackendError => "VerificationBackendError",
            Self::KeyStore => "KeyStore",
            Self::Config => "Config",
            Self::InvalidAttribution => "InvalidAttribution",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, ImageIpError>;
