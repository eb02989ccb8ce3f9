//! Error types for QBits.

use std::fmt;
use thiserror::Error;

/// Result type alias for QBits operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing keys or sealing and opening envelopes.
#[derive(Error, Debug)]
pub enum Error {
    /// Algorithm name or identifier is not recognized.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// No live session with this identifier.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Key file is malformed, incomplete, or cannot be unlocked.
    #[error("Invalid key file: {0}")]
    InvalidKeyFile(String),

    /// Envelope bytes are structurally invalid.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Tag verification failed (wrong key or tampered envelope).
    #[error("Authentication failed: wrong key or tampered envelope")]
    AuthenticationFailure,

    /// A cryptographic primitive failed (e.g. entropy source unavailable).
    #[error("Internal crypto failure: {0}")]
    InternalCryptoFailure(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is out of range or unreadable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Machine-readable error category, stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown algorithm name or tag.
    UnsupportedAlgorithm,
    /// Session id unknown or expired.
    SessionNotFound,
    /// Key file unreadable, inconsistent, or locked with another passphrase.
    InvalidKeyFile,
    /// Envelope bytes do not parse.
    MalformedEnvelope,
    /// Tag or key check failed; the envelope was altered or the key is wrong.
    AuthenticationFailure,
    /// A primitive failed where it should not.
    InternalCryptoFailure,
    /// Filesystem error.
    Io,
    /// Rejected configuration value.
    InvalidConfig,
    /// JSON encoding or decoding failed.
    Serialization,
}

impl ErrorKind {
    /// Stable snake_case identifier, suitable for structured responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedAlgorithm => "unsupported_algorithm",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::InvalidKeyFile => "invalid_key_file",
            ErrorKind::MalformedEnvelope => "malformed_envelope",
            ErrorKind::AuthenticationFailure => "authentication_failure",
            ErrorKind::InternalCryptoFailure => "internal_crypto_failure",
            ErrorKind::Io => "io",
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::Serialization => "serialization",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            Error::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Error::InvalidKeyFile(_) => ErrorKind::InvalidKeyFile,
            Error::MalformedEnvelope(_) => ErrorKind::MalformedEnvelope,
            Error::AuthenticationFailure => ErrorKind::AuthenticationFailure,
            Error::InternalCryptoFailure(_) => ErrorKind::InternalCryptoFailure,
            Error::Io(_) => ErrorKind::Io,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::Serialization(_) => ErrorKind::Serialization,
        }
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedEnvelope(msg.into())
    }

    pub(crate) fn key_file(msg: impl Into<String>) -> Self {
        Error::InvalidKeyFile(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rand::Error> for Error {
    fn from(e: rand::Error) -> Self {
        Error::InternalCryptoFailure(format!("entropy source unavailable: {}", e))
    }
}
