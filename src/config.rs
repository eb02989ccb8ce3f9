//! Configuration constants and types for QBits.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Envelope magic number: "QBEV" in bytes.
pub const ENVELOPE_MAGIC: [u8; 4] = [0x51, 0x42, 0x45, 0x56];

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// AES-GCM nonce size (96 bits).
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size (128 bits).
pub const TAG_SIZE: usize = 16;

/// Symmetric key size (256 bits).
pub const KEY_SIZE: usize = 32;

/// Longest filename hint accepted in an envelope header.
pub const MAX_FILENAME_HINT: usize = 255;

/// Key file format marker.
pub const KEYFILE_FORMAT: &str = "qbits-keyfile";

/// Current key file version.
pub const KEYFILE_VERSION: u32 = 1;

/// Default session lifetime (1 hour).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Default cap on live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Argon2id parameters for key file protection.
pub mod argon2_params {
    /// Memory cost in KiB (64 MB).
    pub const MEMORY_COST: u32 = 65536;

    /// Time cost (iterations).
    pub const TIME_COST: u32 = 3;

    /// Parallelism factor.
    pub const PARALLELISM: u32 = 4;

    /// Output length in bytes (256 bits).
    pub const OUTPUT_LENGTH: usize = 32;

    /// Salt length in bytes.
    pub const SALT_LENGTH: usize = 32;

    /// Largest memory cost accepted from an imported key file (1 GiB).
    pub const MAX_MEMORY_COST: u32 = 1 << 20;

    /// Largest time cost accepted from an imported key file.
    pub const MAX_TIME_COST: u32 = 16;

    /// Largest parallelism accepted from an imported key file.
    pub const MAX_PARALLELISM: u32 = 16;
}

/// Argon2id cost parameters, stored alongside passphrase-protected keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Iterations.
    pub iterations: u32,
    /// Lanes.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: argon2_params::MEMORY_COST,
            iterations: argon2_params::TIME_COST,
            parallelism: argon2_params::PARALLELISM,
        }
    }
}

impl KdfParams {
    /// Validate the parameters against the accepted bounds.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.memory_kib == 0 || self.memory_kib > argon2_params::MAX_MEMORY_COST {
            return Err(format!(
                "Argon2 memory must be between 1 and {} KiB",
                argon2_params::MAX_MEMORY_COST
            ));
        }
        if self.iterations == 0 || self.iterations > argon2_params::MAX_TIME_COST {
            return Err(format!(
                "Argon2 iterations must be between 1 and {}",
                argon2_params::MAX_TIME_COST
            ));
        }
        if self.parallelism == 0 || self.parallelism > argon2_params::MAX_PARALLELISM {
            return Err(format!(
                "Argon2 parallelism must be between 1 and {}",
                argon2_params::MAX_PARALLELISM
            ));
        }
        Ok(())
    }
}

/// Session eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Sessions older than this are dropped. `None` keeps them for the process lifetime.
    pub ttl: Option<Duration>,
    /// Oldest sessions are evicted beyond this count. `None` means unbounded.
    pub max_sessions: Option<usize>,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(DEFAULT_SESSION_TTL_SECS)),
            max_sessions: Some(DEFAULT_MAX_SESSIONS),
        }
    }
}

impl SessionPolicy {
    /// Keep every session until explicitly evicted.
    pub fn unbounded() -> Self {
        Self {
            ttl: None,
            max_sessions: None,
        }
    }
}

/// Service configuration, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Session lifetime in seconds (`null` disables expiry).
    pub session_ttl_secs: Option<u64>,

    /// Maximum live sessions (`null` disables the cap).
    pub max_sessions: Option<usize>,

    /// Argon2id parameters used when protecting exported key files.
    pub keyfile_kdf: KdfParams,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: Some(DEFAULT_SESSION_TTL_SECS),
            max_sessions: Some(DEFAULT_MAX_SESSIONS),
            keyfile_kdf: KdfParams::default(),
        }
    }
}

impl ServiceConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let config: ServiceConfig = serde_json::from_slice(&raw)
            .map_err(|e| Error::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate().map_err(Error::InvalidConfig)?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.session_ttl_secs == Some(0) {
            return Err("Session TTL must be greater than 0".to_string());
        }
        if self.max_sessions == Some(0) {
            return Err("Max sessions must be greater than 0".to_string());
        }
        self.keyfile_kdf.validate()
    }

    /// Session policy derived from this configuration.
    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            ttl: self.session_ttl_secs.map(Duration::from_secs),
            max_sessions: self.max_sessions,
        }
    }
}
