use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::store::{CacheEntry, Persistence};
use crate::auth::AuthError;

type Fetcher<K, T> = dyn Fn(K) -> BoxFuture<'static, Result<T, AuthError>> + Send + Sync;
type Slot<T> = Arc<Mutex<Option<CacheEntry<T>>>>;

/// Per-domain cache with at most one in-flight fetch per key.
///
/// Each key has its own async lock; a caller that finds the slot empty holds
/// the lock across the fetch, so concurrent callers wait for that result
/// instead of fetching again. Different keys never block each other.
pub struct CacheActor<K, T> {
    name: String,
    fetcher: Box<Fetcher<K, T>>,
    slots: StdMutex<HashMap<K, Slot<T>>>,
    persistence: Option<Box<dyn Persistence<K, T>>>,
}

impl<K, T> CacheActor<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug,
    T: Clone + Send + Sync,
{
    pub fn new<F>(name: impl Into<String>, fetcher: F) -> Self
    where
        F: Fn(K) -> BoxFuture<'static, Result<T, AuthError>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fetcher: Box::new(fetcher),
            slots: StdMutex::new(HashMap::new()),
            persistence: None,
        }
    }

    /// Load from `persistence` on a miss and write every fetch through to it
    pub fn with_persistence(mut self, persistence: Box<dyn Persistence<K, T>>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    fn slot(&self, key: &K) -> Slot<T> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key.clone()).or_default())
    }

    /// Cached value, fetching only when there is none.
    pub async fn get_cached(&self, key: K) -> Result<CacheEntry<T>, AuthError> {
        let slot = self.slot(&key);
        let mut current = slot.lock().await;
        if let Some(entry) = current.as_ref() {
            return Ok(entry.clone());
        }

        if let Some(entry) = self.load_persisted(&key) {
            *current = Some(entry.clone());
            return Ok(entry);
        }

        let entry = self.fetch(key).await?;
        *current = Some(entry.clone());
        Ok(entry)
    }

    /// Fetch unconditionally and replace whatever was cached.
    ///
    /// On failure the previous entry is kept.
    pub async fn get_refreshed(&self, key: K) -> Result<CacheEntry<T>, AuthError> {
        let slot = self.slot(&key);
        let mut current = slot.lock().await;
        let entry = self.fetch(key).await?;
        *current = Some(entry.clone());
        Ok(entry)
    }

    /// Cached entry without fetching; waits for an in-flight fetch of `key`
    pub async fn peek(&self, key: &K) -> Option<CacheEntry<T>> {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(key).cloned()
        }?;
        let current = slot.lock().await;
        current.clone()
    }

    /// Drop the entry for `key`. An in-flight fetch of `key` finishes first.
    pub async fn invalidate(&self, key: &K) {
        let slot = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.get(key).cloned()
        };
        if let Some(slot) = slot {
            *slot.lock().await = None;
        }
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.remove(key) {
                warn!(cache = %self.name, error = %format!("{:#}", e), "Failed to remove persisted entry");
            }
        }
    }

    pub async fn clear(&self) {
        // Slots stay in the map so later callers share the same lock
        let slots: Vec<Slot<T>> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.values().cloned().collect()
        };
        for slot in slots {
            *slot.lock().await = None;
        }
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.clear() {
                warn!(cache = %self.name, error = %format!("{:#}", e), "Failed to clear persisted entries");
            }
        }
    }

    async fn fetch(&self, key: K) -> Result<CacheEntry<T>, AuthError> {
        debug!(cache = %self.name, key = ?key, "Fetching");
        let value = (self.fetcher)(key.clone()).await?;
        let entry = CacheEntry::new(value);

        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(&key, &entry) {
                warn!(cache = %self.name, error = %format!("{:#}", e), "Failed to persist entry");
            }
        }
        Ok(entry)
    }

    fn load_persisted(&self, key: &K) -> Option<CacheEntry<T>> {
        match self.persistence.as_ref()?.load(key) {
            Ok(Some(entry)) if entry.is_stale() => {
                debug!(cache = %self.name, key = ?key, age = %entry.age_display(), "Persisted entry is stale, refetching");
                None
            }
            Ok(entry) => entry,
            Err(e) => {
                warn!(cache = %self.name, error = %format!("{:#}", e), "Ignoring unreadable persisted entry");
                None
            }
        }
    }
}
