//! Session store with TTL and capacity eviction.

use super::{MemoryBackend, Session, SessionBackend, SessionId};
use crate::config::{KdfParams, SessionPolicy};
use crate::error::{Error, Result};
use crate::keys::{KeyFile, KeyPair};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts at drawing an unused session id before giving up.
const MAX_ID_ATTEMPTS: usize = 4;

/// Owned session table.
///
/// Nothing is persisted; dropping the store drops every key pair it holds.
pub struct SessionStore {
    backend: Box<dyn SessionBackend>,
    policy: SessionPolicy,
    keyfile_kdf: KdfParams,
}

impl SessionStore {
    pub fn new(backend: Box<dyn SessionBackend>, policy: SessionPolicy) -> Self {
        if policy.ttl.is_none() || policy.max_sessions.is_none() {
            warn!(
                backend = backend.name(),
                "session store without TTL or capacity limit; memory use is unbounded"
            );
        }
        Self {
            backend,
            policy,
            keyfile_kdf: KdfParams::default(),
        }
    }

    /// A store over a fresh [`MemoryBackend`].
    pub fn in_memory(policy: SessionPolicy) -> Self {
        Self::new(Box::new(MemoryBackend::new()), policy)
    }

    /// Argon2 parameters used when exporting protected key files.
    pub fn with_keyfile_kdf(mut self, params: KdfParams) -> Self {
        self.keyfile_kdf = params;
        self
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Register a key pair under a fresh id.
    pub fn create(&self, key_pair: KeyPair) -> Result<SessionId> {
        self.evict_expired()?;
        self.make_room()?;

        let algorithm = key_pair.algorithm();
        let mut key_pair = Some(key_pair);

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = SessionId::generate()?;
            let pair = match key_pair.take() {
                Some(pair) => pair,
                None => break,
            };
            let session = Arc::new(Session::new(id.clone(), pair));

            if self.backend.insert(Arc::clone(&session))? {
                info!(session = %id, algorithm = %algorithm, "session created");
                return Ok(id);
            }

            warn!(session = %id, "session id collision, retrying");
            // The backend refused it, so this is the only reference.
            key_pair = Arc::try_unwrap(session).ok().map(|s| s.key_pair);
        }

        Err(Error::InternalCryptoFailure(
            "could not allocate a unique session id".to_string(),
        ))
    }

    /// Look up a live session. Expired entries are removed on access.
    pub fn get(&self, id: &SessionId) -> Result<Arc<Session>> {
        let session = self
            .backend
            .get(id)?
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;

        if let Some(ttl) = self.policy.ttl {
            if session.is_expired(ttl, Utc::now()) {
                self.backend.remove(id)?;
                info!(session = %id, "session expired");
                return Err(Error::SessionNotFound(id.to_string()));
            }
        }

        Ok(session)
    }

    /// Recreate a session from an exported key file. The new session gets a
    /// fresh id.
    pub fn import_key_file(&self, bytes: &[u8], passphrase: Option<&str>) -> Result<SessionId> {
        let file = KeyFile::parse(bytes)?;
        let key_pair = file.unlock(passphrase)?;
        debug!(
            algorithm = %file.algorithm,
            exported_session = file.session_id.as_deref().unwrap_or("-"),
            "key file imported"
        );
        self.create(key_pair)
    }

    /// Export a session's key pair as pretty JSON, sealed under `passphrase`
    /// when one is given.
    pub fn export_key_file(&self, id: &SessionId, passphrase: Option<&str>) -> Result<Vec<u8>> {
        let session = self.get(id)?;
        let file = KeyFile::from_key_pair(
            &session.key_pair,
            Some(session.id.as_str()),
            session.created_at,
            passphrase.map(|p| (p, self.keyfile_kdf)),
        )?;
        debug!(session = %id, protected = file.is_protected(), "key file exported");
        file.to_json()
    }

    /// Drop a session. Returns whether it existed.
    pub fn evict(&self, id: &SessionId) -> Result<bool> {
        let removed = self.backend.remove(id)?.is_some();
        if removed {
            info!(session = %id, "session evicted");
        }
        Ok(removed)
    }

    /// Drop every expired session, returning how many went.
    pub fn evict_expired(&self) -> Result<usize> {
        let ttl = match self.policy.ttl {
            Some(ttl) => ttl,
            None => return Ok(0),
        };

        let now = Utc::now();
        let mut evicted = 0;
        for session in self.backend.snapshot()? {
            if session.is_expired(ttl, now) && self.backend.remove(&session.id)?.is_some() {
                evicted += 1;
            }
        }
        if evicted > 0 {
            info!(count = evicted, "expired sessions evicted");
        }
        Ok(evicted)
    }

    /// Evict oldest sessions until one more fits under the cap.
    fn make_room(&self) -> Result<()> {
        let max = match self.policy.max_sessions {
            Some(max) => max,
            None => return Ok(()),
        };

        let len = self.backend.len()?;
        if len < max {
            return Ok(());
        }

        let mut sessions = self.backend.snapshot()?;
        sessions.sort_by_key(|s| s.created_at);
        for session in sessions.iter().take(len + 1 - max) {
            if self.backend.remove(&session.id)?.is_some() {
                warn!(session = %session.id, "session evicted at capacity");
            }
        }
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        self.backend.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate, Algorithm};
    use std::thread;
    use std::time::Duration;

    fn kyber() -> KeyPair {
        generate(Algorithm::Kyber768).unwrap()
    }

    fn light_kdf() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = SessionStore::in_memory(SessionPolicy::default());
        assert!(store.is_empty().unwrap());

        let id = store.create(kyber()).unwrap();
        let session = store.get(&id).unwrap();
        assert_eq!(session.id, id);
        assert_eq!(session.algorithm(), Algorithm::Kyber768);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_unknown_session() {
        let store = SessionStore::in_memory(SessionPolicy::default());
        let err = store.get(&SessionId::from("nope")).unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(id) if id == "nope"));
    }

    #[test]
    fn test_explicit_eviction() {
        let store = SessionStore::in_memory(SessionPolicy::default());
        let id = store.create(kyber()).unwrap();

        assert!(store.evict(&id).unwrap());
        assert!(!store.evict(&id).unwrap());
        assert!(matches!(store.get(&id), Err(Error::SessionNotFound(_))));
    }

    #[test]
    fn test_expired_sessions_disappear() {
        let store = SessionStore::in_memory(SessionPolicy {
            ttl: Some(Duration::from_millis(20)),
            max_sessions: None,
        });
        let a = store.create(kyber()).unwrap();
        let b = store.create(kyber()).unwrap();

        thread::sleep(Duration::from_millis(40));

        assert!(matches!(store.get(&a), Err(Error::SessionNotFound(_))));
        assert_eq!(store.evict_expired().unwrap(), 1);
        assert!(matches!(store.get(&b), Err(Error::SessionNotFound(_))));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = SessionStore::in_memory(SessionPolicy {
            ttl: None,
            max_sessions: Some(2),
        });
        let first = store.create(kyber()).unwrap();
        thread::sleep(Duration::from_millis(5));
        let second = store.create(kyber()).unwrap();
        thread::sleep(Duration::from_millis(5));
        let third = store.create(kyber()).unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert!(store.get(&first).is_err());
        assert!(store.get(&second).is_ok());
        assert!(store.get(&third).is_ok());
    }

    #[test]
    fn test_unbounded_policy_keeps_everything() {
        let store = SessionStore::in_memory(SessionPolicy::unbounded());
        for _ in 0..5 {
            store.create(kyber()).unwrap();
        }
        assert_eq!(store.evict_expired().unwrap(), 0);
        assert_eq!(store.len().unwrap(), 5);
    }

    #[test]
    fn test_export_import_gives_new_session_with_same_keys() {
        let store = SessionStore::in_memory(SessionPolicy::default()).with_keyfile_kdf(light_kdf());
        let id = store.create(kyber()).unwrap();

        for passphrase in [None, Some("open sesame")] {
            let json = store.export_key_file(&id, passphrase).unwrap();
            let imported = store.import_key_file(&json, passphrase).unwrap();
            assert_ne!(imported, id);

            let (ciphertext, sent) = store.get(&id).unwrap().key_pair.encapsulate().unwrap();
            let received = store
                .get(&imported)
                .unwrap()
                .key_pair
                .decapsulate(&ciphertext)
                .unwrap();
            assert_eq!(*sent, *received);
        }
    }

    #[test]
    fn test_import_rejects_garbage_without_side_effects() {
        let store = SessionStore::in_memory(SessionPolicy::default());
        let err = store.import_key_file(b"{\"format\":", None).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyFile(_)));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_concurrent_readers() {
        let store = Arc::new(SessionStore::in_memory(SessionPolicy::default()));
        let id = store.create(kyber()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = id.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(store.get(&id).unwrap().id, id);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_concurrent_creators() {
        let store = Arc::new(SessionStore::in_memory(SessionPolicy::unbounded()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.create(kyber()).unwrap())
            })
            .collect();

        let ids: std::collections::HashSet<_> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(store.len().unwrap(), 4);
    }
}
