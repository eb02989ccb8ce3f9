//! In-memory sessions binding an opaque id to a key pair.

mod backend;
mod store;

pub use backend::{MemoryBackend, SessionBackend};
pub use store::SessionStore;

use crate::error::Result;
use crate::keys::{Algorithm, KeyPair};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::time::Duration;

/// Random bytes in a session id.
const SESSION_ID_BYTES: usize = 16;

/// Opaque session identifier: 128 random bits as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Draw a fresh id from the OS RNG.
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        OsRng.try_fill_bytes(&mut bytes)?;
        Ok(Self(hex::encode(bytes)))
    }

    /// The id as hex text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A live session. Immutable once created.
#[derive(Debug)]
pub struct Session {
    /// Id the store files this session under.
    pub id: SessionId,
    /// Key material for every operation in this session.
    pub key_pair: KeyPair,
    /// Start of the TTL window.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Wrap `key_pair` under `id`, stamped with the current time.
    pub fn new(id: SessionId, key_pair: KeyPair) -> Self {
        Self {
            id,
            key_pair,
            created_at: Utc::now(),
        }
    }

    /// Algorithm of the held key pair.
    pub fn algorithm(&self) -> Algorithm {
        self.key_pair.algorithm()
    }

    /// Whether the session has outlived `ttl` at `now`.
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.created_at >= ttl,
            // A TTL too large for chrono never elapses.
            Err(_) => false,
        }
    }
}
