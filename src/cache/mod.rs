//! Bounded key/value cache with TTL expiry and pluggable eviction.
//!
//! [`Cache`] is shared behind an `Arc` and guards its state with a single mutex.
//! Expiry is checked lazily on every access and eagerly by the optional
//! [`spawn_sweeper`] task. When the cache is full, expired entries go first,
//! then the configured [`EvictionStrategy`] picks one victim.
//!
//! Values are owned clones. Nothing in the cache points into the corpus, so an
//! eviction can only cost a recomputation, never correctness.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{KnowledgeError, Result};

/// Victim selection policy once the cache is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Least recently used.
    #[default]
    Lru,
    /// Least frequently used; ties fall back to least recently used.
    Lfu,
}

impl std::fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lru => f.write_str("lru"),
            Self::Lfu => f.write_str("lfu"),
        }
    }
}

/// Counters reported by [`Cache::stats`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room (capacity pressure).
    pub evictions: u64,
    /// Entries removed because their TTL elapsed.
    pub expirations: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry<V> {
    value: V,
    expires_at: Option<Instant>,
    access_count: u64,
    /// Logical clock value of the last read or write.
    last_access: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<V> CacheState<V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        let removed = before - self.entries.len();
        self.expirations += removed as u64;
        removed
    }
}

/// Generic bounded cache keyed by strings.
pub struct Cache<V> {
    state: Mutex<CacheState<V>>,
    capacity: usize,
    default_ttl: Option<Duration>,
    strategy: EvictionStrategy,
}

impl<V: Clone> Cache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    ///
    /// `default_ttl` applies to [`set`](Self::set) calls that pass `None`;
    /// `None` here means entries never expire unless given an explicit TTL.
    pub fn new(capacity: usize, default_ttl: Option<Duration>, strategy: EvictionStrategy) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            }),
            capacity: capacity.max(1),
            default_ttl,
            strategy,
        }
    }

    /// Build from the `[cache]` config section.
    pub fn from_config(config: &crate::config::CacheConfig) -> Self {
        let ttl = (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs));
        Self::new(config.capacity, ttl, config.strategy)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        // A panic while holding the lock cannot leave entries half-written,
        // so the state is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up `key`, counting a hit or a miss. Expired entries are removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;
        let tick = state.next_tick();

        let expired = match state.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.access_count += 1;
                entry.last_access = tick;
                let value = entry.value.clone();
                state.hits += 1;
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            state.expirations += 1;
        }
        state.misses += 1;
        None
    }

    /// Insert or replace `key`. `ttl = None` uses the cache's default TTL.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let now = Instant::now();
        let expires_at = ttl.or(self.default_ttl).map(|d| now + d);
        let mut guard = self.lock();
        let state = &mut *guard;
        let tick = state.next_tick();

        if let Some(entry) = state.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            entry.last_access = tick;
            return;
        }

        if state.entries.len() >= self.capacity {
            state.purge_expired(now);
        }
        while state.entries.len() >= self.capacity {
            match self.select_victim(state) {
                Some(victim) => {
                    state.entries.remove(&victim);
                    state.evictions += 1;
                    tracing::trace!(key = %victim, strategy = %self.strategy, "cache eviction");
                }
                None => break,
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at,
                access_count: 0,
                last_access: tick,
            },
        );
    }

    /// `true` if `key` is present and unexpired. Does not touch hit/miss
    /// counters or recency.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;
        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(now),
            None => return false,
        };
        if expired {
            state.entries.remove(key);
            state.expirations += 1;
        }
        !expired
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().entries.remove(key).map(|e| e.value)
    }

    /// Remove every key matching a wildcard pattern (`*`, `?`, `[abc]`).
    /// Returns the number of removed entries.
    pub fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        let matcher = glob::Pattern::new(pattern).map_err(|e| KnowledgeError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.msg.to_string(),
        })?;
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|key, _| !matcher.matches(key));
        let removed = before - state.entries.len();
        tracing::debug!(pattern, removed, "cache pattern invalidated");
        Ok(removed)
    }

    /// Eagerly drop expired entries. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.lock().purge_expired(Instant::now())
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            size: state.entries.len(),
            capacity: self.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
        }
    }

    pub fn strategy(&self) -> EvictionStrategy {
        self.strategy
    }

    fn select_victim(&self, state: &CacheState<V>) -> Option<String> {
        let entries = state.entries.iter();
        let victim = match self.strategy {
            EvictionStrategy::Lru => entries.min_by_key(|(_, e)| e.last_access),
            EvictionStrategy::Lfu => entries.min_by_key(|(_, e)| (e.access_count, e.last_access)),
        };
        victim.map(|(k, _)| k.clone())
    }
}

/// Run [`Cache::sweep`] every `interval` until the cache is dropped.
pub fn spawn_sweeper<V>(cache: &Arc<Cache<V>>, interval: Duration) -> tokio::task::JoinHandle<()>
where
    V: Clone + Send + 'static,
{
    let weak = Arc::downgrade(cache);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(cache) = weak.upgrade() else {
                break;
            };
            let removed = cache.sweep();
            if removed > 0 {
                tracing::debug!(removed, "cache sweep expired entries");
            }
        }
    })
}
