use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use tracing::warn;

/// Key → counter storage with per-entry expiry. The in-process
/// `MemoryCounterStore` only limits a single instance; deployments with more
/// than one process need an implementation backed by a shared store.
pub trait CounterStore: Send + Sync {
    /// Count one hit for `key`.
    ///
    /// With no live entry, starts a new one at 1 that expires after `ttl`.
    /// With a live entry already at `limit`, returns `None` and leaves it
    /// untouched. Otherwise increments it, pushes its expiry to `now + ttl`
    /// and returns the new count.
    fn try_increment(&self, key: &str, limit: u32, ttl: Duration, now: Instant) -> Option<u32>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    expires_at: Instant,
}

/// In-memory counter store holding at most `max_keys` callers. Accepted hits
/// promote their key, so with a fixed TTL the least recently used key is also
/// the one closest to expiry, and that is the one a new caller displaces.
pub struct MemoryCounterStore {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryCounterStore {
    pub fn new(max_keys: usize) -> Self {
        let cap = NonZeroUsize::new(max_keys).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }
}

impl CounterStore for MemoryCounterStore {
    fn try_increment(&self, key: &str, limit: u32, ttl: Duration, now: Instant) -> Option<u32> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(entry) = entries.peek_mut(key) {
            if entry.expires_at > now {
                if entry.count >= limit {
                    return None;
                }
                entry.count += 1;
                entry.expires_at = now + ttl;
                let count = entry.count;
                entries.promote(key);
                return Some(count);
            }
        }

        // Stale or unknown: start over. `put` evicts the LRU key when full.
        entries.put(
            key.to_string(),
            Entry {
                count: 1,
                expires_at: now + ttl,
            },
        );
        Some(1)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_millis(60_000),
        }
    }
}

/// Per-caller request limiter for comment creation.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    /// In-process limiter that tracks at most `max_requests` distinct callers.
    pub fn in_memory(config: RateLimitConfig) -> Self {
        let store = MemoryCounterStore::new(config.max_requests as usize);
        Self::new(Arc::new(store), config)
    }

    /// Returns `true` when the request may proceed.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let allowed = self
            .store
            .try_increment(key, self.config.max_requests, self.config.window, now)
            .is_some();
        if !allowed {
            warn!(key, max = self.config.max_requests, "Rate limit exceeded");
        }
        allowed
    }
}
