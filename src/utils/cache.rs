//! In-memory response cache with TTL expiry, LRU eviction and single-flight fetches.
//!
//! [`ResponseCache::get_or_fetch`] guarantees at most one in-flight fetch per
//! key: concurrent callers for the same key await a shared result. The fetch
//! runs on its own task, so it completes and populates the cache even if
//! every caller waiting on it is cancelled. Failed fetches are never cached
//! and leave any existing entry untouched.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use lru::LruCache;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;

type SharedFetch<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Item was found and is valid
    Hit(T),

    /// Item was not found
    Miss,

    /// Item was found but has expired
    Expired,
}

/// Counters describing cache behavior since creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Lookups served from a fresh entry
    pub hits: u64,
    /// Lookups that found no fresh entry
    pub misses: u64,
    /// Callers that joined a fetch already in flight
    pub joined: u64,
    /// Upstream fetches started
    pub fetches: u64,
    /// Fetches that failed (not cached)
    pub failures: u64,
    /// Entries evicted to respect the capacity bound
    pub evictions: u64,
    /// Entries currently stored (fresh or expired)
    pub entries: usize,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

struct Inner<K: Hash + Eq, V, E> {
    entries: LruCache<K, Entry<V>>,
    in_flight: HashMap<K, SharedFetch<V, E>>,
    stats: CacheStats,
}

/// Generic TTL + LRU cache keyed by `K`
pub struct ResponseCache<K: Hash + Eq, V, E> {
    name: &'static str,
    ttl: Duration,
    inner: Arc<Mutex<Inner<K, V, E>>>,
}

impl<K: Hash + Eq, V, E> fmt::Debug for ResponseCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, V, E> ResponseCache<K, V, E>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    /// Create a cache holding at most `capacity` entries, each fresh for `ttl`
    pub fn new(name: &'static str, ttl: Duration, capacity: NonZeroUsize) -> Self {
        Self {
            name,
            ttl,
            inner: Arc::new(Mutex::new(Inner {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
                stats: CacheStats::default(),
            })),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a key without fetching. A hit refreshes the entry's LRU position.
    pub fn lookup(&self, key: &K) -> CacheResult<V> {
        let mut inner = lock(&self.inner);
        let ttl = self.ttl;
        match inner.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < ttl => CacheResult::Hit(entry.value.clone()),
            Some(_) => CacheResult::Expired,
            None => CacheResult::Miss,
        }
    }

    /// Return the cached value for `key`, or run `fetch` exactly once across
    /// all concurrent callers and cache its successful result.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let pending = {
            let mut guard = lock(&self.inner);
            let inner = &mut *guard;
            let ttl = self.ttl;

            let fresh = inner
                .entries
                .get(&key)
                .filter(|entry| entry.inserted_at.elapsed() < ttl)
                .map(|entry| entry.value.clone());
            if let Some(value) = fresh {
                inner.stats.hits += 1;
                tracing::trace!(cache = self.name, ?key, "Cache HIT");
                return Ok(value);
            }
            inner.stats.misses += 1;

            match inner.in_flight.get(&key) {
                Some(pending) => {
                    let pending = pending.clone();
                    inner.stats.joined += 1;
                    tracing::trace!(cache = self.name, ?key, "Joining in-flight fetch");
                    pending
                }
                None => {
                    inner.stats.fetches += 1;
                    tracing::debug!(cache = self.name, ?key, "Cache MISS, fetching");
                    let pending = self.spawn_fetch(key.clone(), fetch());
                    inner.in_flight.insert(key, pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    fn spawn_fetch<Fut>(&self, key: K, fetch: Fut) -> SharedFetch<V, E>
    where
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let name = self.name;

        let handle = tokio::spawn(async move {
            // Clears the in-flight slot even if the fetch panics
            let _slot = InFlightSlot {
                inner: Arc::clone(&inner),
                key: Some(key.clone()),
            };

            let result = fetch.await;

            let mut guard = lock(&inner);
            match &result {
                Ok(value) => {
                    let entry = Entry {
                        value: value.clone(),
                        inserted_at: Instant::now(),
                    };
                    if let Some((evicted, _)) = guard.entries.push(key.clone(), entry) {
                        if evicted != key {
                            guard.stats.evictions += 1;
                            tracing::trace!(cache = name, key = ?evicted, "Evicted LRU entry");
                        }
                    }
                }
                Err(_) => {
                    guard.stats.failures += 1;
                    tracing::debug!(cache = name, ?key, "Fetch failed, nothing cached");
                }
            }
            result
        });

        async move { handle.await.unwrap_or_else(|err| Err(E::from(err))) }
            .boxed()
            .shared()
    }

    /// Remove one entry; returns whether it was present
    pub fn invalidate(&self, key: &K) -> bool {
        lock(&self.inner).entries.pop(key).is_some()
    }

    /// Remove all entries (in-flight fetches are unaffected)
    pub fn clear(&self) {
        lock(&self.inner).entries.clear();
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut inner = lock(&self.inner);
        let expired: Vec<K> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = lock(&self.inner);
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }
}

struct InFlightSlot<K: Hash + Eq, V, E> {
    inner: Arc<Mutex<Inner<K, V, E>>>,
    key: Option<K>,
}

impl<K: Hash + Eq, V, E> Drop for InFlightSlot<K, V, E> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.inner).in_flight.remove(&key);
        }
    }
}
