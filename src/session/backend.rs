//! Session storage abstraction.
//!
//! The store owns eviction policy; a backend only needs atomic single-entry
//! operations.

use super::{Session, SessionId};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Trait for session storage.
pub trait SessionBackend: Send + Sync {
    /// Insert a session unless its id is already taken.
    ///
    /// Returns `false`, leaving the existing entry untouched, on collision.
    fn insert(&self, session: Arc<Session>) -> Result<bool>;

    fn get(&self, id: &SessionId) -> Result<Option<Arc<Session>>>;

    /// Remove a session, returning it if it was present.
    fn remove(&self, id: &SessionId) -> Result<Option<Arc<Session>>>;

    fn len(&self) -> Result<usize>;

    /// Every live session, in no particular order.
    fn snapshot(&self) -> Result<Vec<Arc<Session>>>;

    /// Get the name of this backend (for logging).
    fn name(&self) -> &'static str;
}

/// Process-local backend over a `RwLock<HashMap>`.
///
/// Readers share the lock and clone an `Arc`; writers hold it for one map
/// operation.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

// A panic while holding the lock cannot leave the map half-updated, so a
// poisoned lock is still safe to use.
impl SessionBackend for MemoryBackend {
    fn insert(&self, session: Arc<Session>) -> Result<bool> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&session.id) {
            return Ok(false);
        }
        sessions.insert(session.id.clone(), session);
        Ok(true)
    }

    fn get(&self, id: &SessionId) -> Result<Option<Arc<Session>>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.get(id).cloned())
    }

    fn remove(&self, id: &SessionId) -> Result<Option<Arc<Session>>> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.remove(id))
    }

    fn len(&self) -> Result<usize> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.len())
    }

    fn snapshot(&self) -> Result<Vec<Arc<Session>>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.values().cloned().collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
