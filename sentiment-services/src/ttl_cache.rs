//! In-memory TTL cache
//!
//! Generic key -> value store with per-entry expiry. Expired entries are
//! never served: `get` deletes them on sight, and a sweeper task (see
//! [`crate::sweeper`]) removes entries nobody reads again.
//!
//! There is no stampede protection. Two callers missing at the same time
//! will both recompute and the last `set` wins.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::sweeper::Sweep;

/// Default interval between background sweeps (5 minutes)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Expiry used when `now + ttl` overflows the clock
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Thread-safe TTL cache
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(name: &str) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            name: name.to_string(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a live value; an expired entry is removed and reported absent
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(key);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `value` for `ttl`, replacing any existing entry
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now + MAX_TTL);

        self.entries.lock().insert(key, CacheEntry { value, expires_at });
    }

    /// Remove a single key, returning whether it was present
    pub fn invalidate<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().remove(key).is_some()
    }

    /// Remove every key matching `pattern`
    pub fn invalidate_matching<F>(&self, pattern: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|k, _| !pattern(k));
        before - entries.len()
    }

    /// Remove all expired entries
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired(now));
        let removed = before - entries.len();

        if removed > 0 {
            debug!("[CACHE:{}] purged {} expired entries", self.name, removed);
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entries = self.entries.lock();
        let expired = entries.values().filter(|e| e.is_expired(now)).count();

        CacheStats {
            name: self.name.clone(),
            total: entries.len(),
            fresh: entries.len() - expired,
            expired,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone> TtlCache<String, V> {
    /// Remove every key starting with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate_matching(|k| k.starts_with(prefix))
    }
}

impl<K, V> Sweep for TtlCache<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub name: String,
    pub total: usize,
    pub fresh: usize,
    pub expired: usize,
    pub hits: u64,
    pub misses: u64,
}
