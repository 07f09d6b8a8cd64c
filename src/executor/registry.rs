//! Session registry: session key → live engine resource

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock, TryLockError};
use tracing::{debug, info};

use crate::SessionKey;
use crate::agent::{AgentEngine, EngineResource};

/// A registered session
#[derive(Debug)]
pub struct SessionEntry {
    key: SessionKey,
    resource: EngineResource,
    /// Serializes the turns of this session
    turn_lock: Mutex<()>,
}

impl SessionEntry {
    fn new(key: SessionKey, resource: EngineResource) -> Self {
        Self {
            key,
            resource,
            turn_lock: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn resource(&self) -> &EngineResource {
        &self.resource
    }

    pub fn is_connected(&self) -> bool {
        self.resource.is_connected()
    }

    /// Wait until no other turn runs on this session
    pub async fn lock_turn(&self) -> MutexGuard<'_, ()> {
        self.turn_lock.lock().await
    }

    /// Claim the session only if it is idle
    pub fn try_lock_turn(&self) -> Result<MutexGuard<'_, ()>, TryLockError> {
        self.turn_lock.try_lock()
    }
}

/// Live sessions of one worker.
///
/// Created at startup and injected into the executor; entries are added on a
/// session's first turn and removed only by [`release`](Self::release) or
/// [`release_all`](Self::release_all).
pub struct SessionRegistry {
    engine: Arc<dyn AgentEngine>,
    entries: RwLock<HashMap<SessionKey, Arc<SessionEntry>>>,
    /// One lock per key so that creation is serialized per key only
    creation_locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<dyn AgentEngine>) -> Self {
        Self {
            engine,
            entries: RwLock::new(HashMap::new()),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Arc<SessionEntry>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Return the session's entry, opening its resource on first contact.
    ///
    /// Concurrent calls for one key open at most one resource; a failed open
    /// leaves no entry behind so a later call can retry.
    pub async fn get_or_create(&self, key: &SessionKey) -> Result<Arc<SessionEntry>> {
        // Fast path: session already exists.
        if let Some(entry) = self.get(key).await {
            return Ok(entry);
        }

        let creation_lock = {
            let mut locks = self.creation_locks.lock().await;
            locks.entry(key.clone()).or_default().clone()
        };
        let creating = creation_lock.lock().await;

        // Re-check under lock: a concurrent caller may have finished first.
        if let Some(entry) = self.get(key).await {
            debug!("Session {} created by concurrent caller", key);
            return Ok(entry);
        }

        let resource = match self.engine.open(key).await {
            Ok(resource) => resource,
            Err(e) => {
                drop(creating);
                drop(creation_lock);
                self.forget_creation_lock(key).await;
                return Err(e);
            }
        };
        let entry = Arc::new(SessionEntry::new(key.clone(), resource));
        self.entries
            .write()
            .await
            .insert(key.clone(), entry.clone());
        info!("Session {} registered ({} engine)", key, self.engine.id());

        Ok(entry)
    }

    /// Release and forget the session; `false` if it was not registered
    pub async fn release(&self, key: &SessionKey) -> bool {
        let entry = self.entries.write().await.remove(key);
        self.forget_creation_lock(key).await;

        match entry {
            Some(entry) => {
                self.engine.release(key, entry.resource()).await;
                true
            }
            None => false,
        }
    }

    /// Drop the key's creation lock unless a creator is still holding it
    async fn forget_creation_lock(&self, key: &SessionKey) {
        let mut locks = self.creation_locks.lock().await;
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// Release every session
    pub async fn release_all(&self) {
        let entries: Vec<_> = self.entries.write().await.drain().collect();
        self.creation_locks.lock().await.clear();

        let releases = entries
            .iter()
            .map(|(key, entry)| self.engine.release(key, entry.resource()));
        futures::future::join_all(releases).await;

        if !entries.is_empty() {
            info!("Released {} session(s)", entries.len());
        }
    }

    /// Registered keys, sorted
    pub async fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<_> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
