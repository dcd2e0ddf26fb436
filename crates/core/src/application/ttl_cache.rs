//! TTL Cache - short-lived memoization for call sites
//!
//! Request handlers that sit in front of the admission queues read slowly
//! changing data (exam metadata, shared counters) on every call. This cache
//! keeps each value for a fixed time-to-live, judged by an injected
//! [`TimeProvider`] so expiry is deterministic in tests.

use crate::port::TimeProvider;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct Entry<V> {
    value: V,
    expires_at: i64,
}

/// Map whose entries expire `ttl` after insertion
pub struct TtlCache<K, V> {
    ttl_ms: i64,
    time_provider: Arc<dyn TimeProvider>,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            time_provider,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fresh value for `key`, dropping it if expired
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.time_provider.now_millis();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let expires_at = self
            .time_provider
            .now_millis()
            .saturating_add(self.ttl_ms);
        self.entries().insert(key, Entry { value, expires_at });
    }

    /// Return the cached value or load, cache and return a new one
    ///
    /// Loader errors are returned as-is and nothing is cached. Concurrent
    /// misses for the same key may each run the loader; the last one wins.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: K, loader: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let value = loader().await?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Drop `key`; returns whether a (possibly expired) entry was present
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of unexpired entries (purges the expired ones)
    pub fn len(&self) -> usize {
        let now = self.time_provider.now_millis();
        let mut entries = self.entries();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
