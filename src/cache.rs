// TTL response cache shielding the rate-limited upstream services.
// One instance is owned by the service root and shared by reference with every consumer.

use dashmap::DashMap;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

pub const FLIGHTS_NAMESPACE: &str = "flights";
pub const LOCATIONS_NAMESPACE: &str = "locations";
pub const ROUTES_NAMESPACE: &str = "routes";

#[derive(Debug, Default)]
pub struct CacheStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub insert_count: AtomicUsize,
    pub expired_count: AtomicUsize,
    pub eviction_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub size: usize,
    pub keys: Vec<String>,
    pub hits: usize,
    pub misses: usize,
    pub inserts: usize,
    pub expired: usize,
    pub evicted: usize,
}

// How long each class of result stays valid. Flight prices are volatile and the
// upstream is rate limited; airport/hotel reference data rarely changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlPolicy {
    pub flight_offers_seconds: u64,
    pub reference_data_seconds: u64,
    pub routes_seconds: u64,
}

impl Default for CacheTtlPolicy {
    fn default() -> Self {
        Self {
            flight_offers_seconds: 300,
            reference_data_seconds: 3600,
            routes_seconds: 1800,
        }
    }
}

impl CacheTtlPolicy {
    pub fn flight_offers(&self) -> Duration {
        Duration::from_secs(self.flight_offers_seconds)
    }

    pub fn reference_data(&self) -> Duration {
        Duration::from_secs(self.reference_data_seconds)
    }

    pub fn routes(&self) -> Duration {
        Duration::from_secs(self.routes_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub sweep_interval_seconds: u64,
    pub ttl: CacheTtlPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 300,
            ttl: CacheTtlPolicy::default(),
        }
    }
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

pub fn create_cache_key(namespace: &str, parts: &[&str]) -> String {
    let mut key = String::from(namespace);
    for part in parts {
        key.push(':');
        key.push_str(part);
    }
    key
}

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

enum Lookup {
    Fresh(serde_json::Value),
    Expired,
    Missing,
}

pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    config: CacheConfig,
    stats: CacheStats,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn ttl_policy(&self) -> &CacheTtlPolicy {
        &self.config.ttl
    }

    // Returns the cached value for `key`, or runs `compute` and caches its success.
    //
    // Failures propagate unchanged and are never stored. Concurrent misses on the
    // same key are not de-duplicated: each caller computes and the last write wins.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.insert(key, &value, ttl);
        Ok(value)
    }

    // Returns an unexpired value. Expired entries are removed on the way.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        let lookup = match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => Lookup::Expired,
            Some(entry) => Lookup::Fresh(entry.value.clone()),
            None => Lookup::Missing,
        };

        match lookup {
            Lookup::Fresh(value) => match serde_json::from_value(value) {
                Ok(decoded) => {
                    self.stats.hit_count.fetch_add(1, Ordering::Relaxed);
                    trace!(key, "cache hit");
                    Some(decoded)
                }
                Err(e) => {
                    warn!(key, error = %e, "cached value has an unexpected shape, treating as miss");
                    self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
                    None
                }
            },
            Lookup::Expired => {
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    self.stats.expired_count.fetch_add(1, Ordering::Relaxed);
                }
                self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache entry expired");
                None
            }
            Lookup::Missing => {
                self.stats.miss_count.fetch_add(1, Ordering::Relaxed);
                trace!(key, "cache miss");
                None
            }
        }
    }

    // Stores `value` until `now + ttl`. Returns false when nothing was stored.
    pub fn insert<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        if ttl.is_zero() {
            return false;
        }
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "value could not be serialized, not caching");
                return false;
            }
        };
        let Some(expires_at) = Instant::now().checked_add(ttl) else {
            warn!(key, ?ttl, "TTL overflow, not caching");
            return false;
        };

        self.entries
            .insert(key.to_string(), CacheEntry { value, expires_at });
        self.stats.insert_count.fetch_add(1, Ordering::Relaxed);
        debug!(key, ttl_secs = ttl.as_secs(), "cached value");
        true
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.eviction_count.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    // Removes every key matching `pattern` and returns how many were removed.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            if pattern.is_match(key) {
                removed += 1;
                false
            } else {
                true
            }
        });
        self.stats
            .eviction_count
            .fetch_add(removed, Ordering::Relaxed);
        debug!(pattern = pattern.as_str(), removed, "invalidated cache entries");
        removed
    }

    pub fn clear(&self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.stats
            .eviction_count
            .fetch_add(removed, Ordering::Relaxed);
        removed
    }

    // Evicts every expired entry, including keys nobody looks up again.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            if entry.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        self.stats
            .expired_count
            .fetch_add(removed, Ordering::Relaxed);
        removed
    }

    // Starts the periodic sweep using the configured interval.
    // Must be called from within a tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        self.spawn_sweeper_every(self.config.sweep_interval())
    }

    // The task only holds a weak reference and ends once the cache is dropped
    pub fn spawn_sweeper_every(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        // tokio intervals panic on a zero period
        let period = if period.is_zero() {
            let fallback = CacheConfig::default().sweep_interval();
            warn!(?fallback, "zero sweep interval, using the default");
            fallback
        } else {
            period
        };
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    debug!("cache dropped, stopping sweeper");
                    break;
                };
                let removed = cache.sweep_expired();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "swept expired cache entries");
                }
            }
        })
    }

    // Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStatsReport {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        CacheStatsReport {
            size: keys.len(),
            keys,
            hits: self.stats.hit_count.load(Ordering::Relaxed),
            misses: self.stats.miss_count.load(Ordering::Relaxed),
            inserts: self.stats.insert_count.load(Ordering::Relaxed),
            expired: self.stats.expired_count.load(Ordering::Relaxed),
            evicted: self.stats.eviction_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
