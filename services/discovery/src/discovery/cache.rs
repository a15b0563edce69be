//! TTL Caches
//!
//! Process-wide memo of discovery results. Entries are replaced as whole
//! values and expire lazily: an expired entry is treated as absent on
//! read and pruned on the next write, purge or sweep.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::DiscoveryError;
use super::types::Resource;

/// Cached value with its own freshness window
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn is_valid_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Hit/miss counters for troubleshooting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Concurrent keyed store with per-entry TTL and optional capacity
pub struct TtlCache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    default_ttl: Duration,
    max_entries: Option<usize>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, default_ttl: Duration) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            max_entries: None,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cap the number of live entries; `None` leaves it unbounded
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries.map(|n| n.max(1));
        self
    }

    /// Value for `key` if present and still within its TTL
    pub fn get(&self, key: &K) -> Result<Option<V>, DiscoveryError> {
        let now = Instant::now();

        let expired = {
            let entries = self.read()?;
            match entries.get(key) {
                Some(entry) if entry.is_valid_at(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => true,
                None => false,
            }
        };

        self.misses.fetch_add(1, Ordering::Relaxed);

        if expired {
            let mut entries = self.write()?;
            if entries.get(key).is_some_and(|e| !e.is_valid_at(now)) {
                entries.remove(key);
                debug!(cache = self.name, "Dropped expired entry");
            }
        }

        Ok(None)
    }

    /// Insert or replace with the default TTL
    pub fn insert(&self, key: K, value: V) -> Result<(), DiscoveryError> {
        self.put(key, value, self.default_ttl)
    }

    /// Insert or replace, resetting `stored_at` to now
    pub fn put(&self, key: K, value: V, ttl: Duration) -> Result<(), DiscoveryError> {
        let now = Instant::now();
        let mut entries = self.write()?;

        if let Some(max) = self.max_entries {
            if !entries.contains_key(&key) && entries.len() >= max {
                self.make_room(&mut entries, max, now);
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                ttl,
            },
        );
        Ok(())
    }

    /// Remove one entry; true if it existed
    pub fn invalidate(&self, key: &K) -> Result<bool, DiscoveryError> {
        Ok(self.write()?.remove(key).is_some())
    }

    /// Remove every entry whose key matches `predicate`
    pub fn invalidate_where<P>(&self, mut predicate: P) -> Result<usize, DiscoveryError>
    where
        P: FnMut(&K) -> bool,
    {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        Ok(before - entries.len())
    }

    pub fn invalidate_all(&self) -> Result<usize, DiscoveryError> {
        let mut entries = self.write()?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    /// Drop every expired entry
    pub fn purge_expired(&self) -> Result<usize, DiscoveryError> {
        let now = Instant::now();
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        Ok(before - entries.len())
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> Result<usize, DiscoveryError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DiscoveryError> {
        Ok(self.read()?.is_empty())
    }

    pub fn stats(&self) -> Result<CacheStats, DiscoveryError> {
        Ok(CacheStats {
            entries: self.len()?,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        })
    }

    fn make_room(&self, entries: &mut HashMap<K, CacheEntry<V>>, max: usize, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        let mut evicted = before - entries.len();

        while entries.len() >= max {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                    evicted += 1;
                }
                None => break,
            }
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(cache = self.name, evicted, "Evicted entries to stay within capacity");
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<K, CacheEntry<V>>>, DiscoveryError> {
        self.entries
            .read()
            .map_err(|_| DiscoveryError::CachePoisoned(self.name))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<K, CacheEntry<V>>>, DiscoveryError> {
        self.entries
            .write()
            .map_err(|_| DiscoveryError::CachePoisoned(self.name))
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Purge expired entries every `every` until the cache is dropped
    /// or the handle is aborted
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let name = self.name;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                match cache.purge_expired() {
                    Ok(0) => {}
                    Ok(purged) => debug!(cache = name, purged, "Swept expired entries"),
                    Err(e) => {
                        warn!(cache = name, error = %e, "Stopping sweeper");
                        break;
                    }
                }
            }
        })
    }
}

/// Key of the resource list cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub user_id: String,
    pub project_id: String,
}

impl ResourceKey {
    pub fn new(user_id: &str, project_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
        }
    }
}

/// Key of the access flag cache
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessKey {
    pub user_id: String,
    pub resource_id: String,
}

impl AccessKey {
    pub fn new(user_id: &str, resource_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            resource_id: resource_id.to_string(),
        }
    }
}

/// (user, project) -> annotated resource list
pub type ResourceCache = TtlCache<ResourceKey, Vec<Resource>>;

/// (user, resource) -> may invoke
pub type AccessCache = TtlCache<AccessKey, bool>;
