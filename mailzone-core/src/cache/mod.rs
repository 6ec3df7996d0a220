//! Two-tier result cache with adaptive TTL, LRU eviction and prefetch.
//!
//! The local tier is an in-process map. An optional [`SharedTier`] is consulted on a
//! local miss; a shared hit is promoted into the local tier. Entries that are read
//! often live longer (up to `ceiling_multiplier` times their base TTL), and entries
//! close to expiry that are still being read can be refreshed ahead of time.

mod entry;
#[cfg(feature = "redis")]
mod redis;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, CoreResult};
use crate::traits::{Clock, SharedTier, SystemClock};

pub use entry::CacheEntry;
#[cfg(feature = "redis")]
pub use redis::RedisTier;

/// Tuning for the result cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheOptions {
    /// Local-tier capacity before LRU eviction.
    pub max_entries: usize,
    pub boost_per_hit: f64,
    pub ceiling_multiplier: f64,
    pub decay_half_life: Duration,
    pub min_hits_for_extension: f64,
    /// Entries with at most this fraction of their TTL left are prefetch candidates.
    pub prefetch_fraction: f64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            boost_per_hit: 0.2,
            ceiling_multiplier: 4.0,
            decay_half_life: Duration::from_secs(600),
            min_hits_for_extension: 1.0,
            prefetch_fraction: 0.2,
        }
    }
}

/// Counters since creation (or the last [`ResultCache::clear`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Hits served by the shared tier (included in `hits`).
    pub shared_hits: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub prefetches: u64,
    pub hit_rate: f64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    shared_hits: AtomicU64,
    sets: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
    prefetches: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn reset(&self) {
        for c in [
            &self.hits,
            &self.misses,
            &self.shared_hits,
            &self.sets,
            &self.invalidations,
            &self.evictions,
            &self.prefetches,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Default)]
struct LocalTier {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

impl LocalTier {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Produces a fresh value for a key that is about to expire.
#[async_trait]
pub trait CacheRefresher: Send + Sync {
    /// `Ok(None)` means the key is not handled by this refresher.
    async fn refresh(&self, key: &str) -> CoreResult<Option<Value>>;
}

/// Result cache shared by the engine's services.
pub struct ResultCache {
    local: Mutex<LocalTier>,
    shared: Option<Arc<dyn SharedTier>>,
    clock: Arc<dyn Clock>,
    options: CacheOptions,
    counters: Counters,
}

impl ResultCache {
    #[must_use]
    pub fn new(options: CacheOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(options: CacheOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            local: Mutex::new(LocalTier::default()),
            shared: None,
            clock,
            options,
            counters: Counters::default(),
        }
    }

    #[must_use]
    pub fn with_shared_tier(mut self, shared: Arc<dyn SharedTier>) -> Self {
        self.shared = Some(shared);
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Reads `key`, falling back to the shared tier on a local miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.get_local(key).await {
            Some(value) => Some(value),
            None => self.get_shared(key).await,
        };

        let Some(value) = value else {
            Counters::bump(&self.counters.misses, 1);
            return None;
        };

        match serde_json::from_value(value) {
            Ok(v) => {
                Counters::bump(&self.counters.hits, 1);
                Some(v)
            }
            Err(e) => {
                log::warn!("[cache] dropping undecodable entry {key}: {e}");
                self.local.lock().await.entries.remove(key);
                Counters::bump(&self.counters.misses, 1);
                None
            }
        }
    }

    async fn get_local(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut local = self.local.lock().await;
        let tick = local.next_tick();
        let expired = match local.entries.get_mut(key) {
            Some(entry) if !entry.is_expired(now, &self.options) => {
                entry.record_hit(now, tick, &self.options);
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            local.entries.remove(key);
        }
        None
    }

    async fn get_shared(&self, key: &str) -> Option<Value> {
        let shared = self.shared.as_ref()?;
        let found = match shared.get(key).await {
            Ok(found) => found?,
            Err(e) => {
                log::warn!("[cache] shared tier '{}' get {key} failed: {e}", shared.name());
                return None;
            }
        };
        let value: Value = match serde_json::from_str(&found.payload) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("[cache] shared tier returned undecodable {key}: {e}");
                return None;
            }
        };

        let ttl = found.ttl.unwrap_or(Duration::from_secs(60));
        self.insert_local(key, value.clone(), ttl).await;
        Counters::bump(&self.counters.shared_hits, 1);
        log::debug!("[cache] promoted {key} from shared tier '{}'", shared.name());
        Some(value)
    }

    /// Stores `value` under `key` for `base_ttl` in every tier.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        base_ttl: Duration,
    ) -> CoreResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| CoreError::Cache(format!("cannot serialize {key}: {e}")))?;
        self.put_value(key, value, base_ttl).await;
        Ok(())
    }

    async fn put_value(&self, key: &str, value: Value, base_ttl: Duration) {
        let payload = self.shared.as_ref().map(|_| value.to_string());
        self.insert_local(key, value, base_ttl).await;
        Counters::bump(&self.counters.sets, 1);

        if let (Some(shared), Some(payload)) = (&self.shared, payload) {
            if let Err(e) = shared.set(key, &payload, base_ttl).await {
                log::warn!("[cache] shared tier '{}' set {key} failed: {e}", shared.name());
            }
        }
    }

    async fn insert_local(&self, key: &str, value: Value, base_ttl: Duration) {
        let now = self.clock.now();
        let mut local = self.local.lock().await;
        let tick = local.next_tick();
        match local.entries.get_mut(key) {
            Some(entry) => entry.refresh(value, base_ttl, now, tick),
            None => {
                local.entries.insert(
                    key.to_string(),
                    CacheEntry::new(key.to_string(), value, base_ttl, now, tick),
                );
            }
        }

        let mut evicted = 0;
        while local.entries.len() > self.options.max_entries {
            let Some(oldest) = local
                .entries
                .values()
                .min_by_key(|e| e.last_tick)
                .map(|e| e.key.clone())
            else {
                break;
            };
            local.entries.remove(&oldest);
            evicted += 1;
        }
        if evicted > 0 {
            Counters::bump(&self.counters.evictions, evicted);
            log::debug!("[cache] evicted {evicted} least recently used entries");
        }
    }

    /// Removes `prefix_or_key` and every key starting with it. Returns the number of local entries removed.
    pub async fn invalidate(&self, prefix_or_key: &str) -> usize {
        let removed = {
            let mut local = self.local.lock().await;
            let before = local.entries.len();
            local.entries.retain(|k, _| !k.starts_with(prefix_or_key));
            before - local.entries.len()
        };

        if let Some(shared) = &self.shared {
            if let Err(e) = shared.invalidate(prefix_or_key).await {
                log::warn!(
                    "[cache] shared tier '{}' invalidate {prefix_or_key} failed: {e}",
                    shared.name()
                );
            }
        }

        Counters::bump(&self.counters.invalidations, removed as u64);
        log::debug!("[cache] invalidated {removed} entries under {prefix_or_key}");
        removed
    }

    /// Drops every local entry and resets the counters.
    pub async fn clear(&self) {
        self.local.lock().await.entries.clear();
        self.counters.reset();
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.local.lock().await.entries.len();
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        // u64 -> f64: counters stay far below 2^52
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        };
        CacheStats {
            hits,
            misses,
            shared_hits: self.counters.shared_hits.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            prefetches: self.counters.prefetches.load(Ordering::Relaxed),
            hit_rate,
            entries,
        }
    }

    /// Keys close to expiry that were read within their last effective TTL.
    pub async fn prefetch_candidates(&self) -> Vec<String> {
        let now = self.clock.now();
        let local = self.local.lock().await;
        let mut keys: Vec<String> = local
            .entries
            .values()
            .filter(|e| e.wants_prefetch(now, &self.options))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Refreshes every prefetch candidate through `refresher`. Returns the number refreshed.
    pub async fn prefetch_tick(&self, refresher: &dyn CacheRefresher) -> usize {
        let mut refreshed = 0;
        for key in self.prefetch_candidates().await {
            let base_ttl = {
                let local = self.local.lock().await;
                match local.entries.get(&key) {
                    Some(entry) => entry.base_ttl,
                    None => continue,
                }
            };
            match refresher.refresh(&key).await {
                Ok(Some(value)) => {
                    self.put_value(&key, value, base_ttl).await;
                    refreshed += 1;
                }
                Ok(None) => {}
                Err(e) => log::warn!("[cache] prefetch of {key} failed: {e}"),
            }
        }
        if refreshed > 0 {
            Counters::bump(&self.counters.prefetches, refreshed as u64);
            log::debug!("[cache] prefetched {refreshed} entries");
        }
        refreshed
    }

    /// Runs [`Self::prefetch_tick`] every `interval` until `cancel` fires.
    pub fn spawn_prefetch_loop(
        self: Arc<Self>,
        refresher: Arc<dyn CacheRefresher>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.prefetch_tick(refresher.as_ref()).await;
                    }
                    () = cancel.cancelled() => {
                        log::debug!("[cache] prefetch loop shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::traits::{InMemorySharedTier, ManualClock, SharedValue};

    fn cache(options: CacheOptions) -> (ResultCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (ResultCache::with_clock(options, clock.clone()), clock)
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (cache, _) = cache(CacheOptions::default());
        cache.put("records:z1", &vec!["a", "b"], MINUTE).await.unwrap();
        let value: Vec<String> = cache.get("records:z1").await.unwrap();
        assert_eq!(value, ["a", "b"]);
        assert!(cache.get::<Vec<String>>("records:z2").await.is_none());

        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses, stats.sets), (1, 1, 1));
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn accessed_key_outlives_unaccessed_key() {
        let (cache, clock) = cache(CacheOptions::default());
        cache.put("hot", &1, MINUTE).await.unwrap();
        cache.put("cold", &2, MINUTE).await.unwrap();
        for _ in 0..3 {
            assert_eq!(cache.get::<i32>("hot").await, Some(1));
        }

        clock.advance(Duration::from_secs(70));
        assert_eq!(cache.get::<i32>("hot").await, Some(1));
        assert_eq!(cache.get::<i32>("cold").await, None);
    }

    #[tokio::test]
    async fn extension_is_bounded_by_ceiling() {
        let (cache, clock) = cache(CacheOptions::default());
        cache.put("hot", &1, MINUTE).await.unwrap();
        for _ in 0..100 {
            cache.get::<i32>("hot").await;
        }
        clock.advance(Duration::from_secs(239));
        assert_eq!(cache.get::<i32>("hot").await, Some(1));
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get::<i32>("hot").await, None);
    }

    #[tokio::test]
    async fn invalidates_by_prefix() {
        let (cache, _) = cache(CacheOptions::default());
        for key in ["records:z1", "records:z2", "zones"] {
            cache.put(key, &0, MINUTE).await.unwrap();
        }
        assert_eq!(cache.invalidate("records:").await, 2);
        assert_eq!(cache.invalidate("zones").await, 1);
        assert_eq!(cache.stats().await.entries, 0);
        assert_eq!(cache.stats().await.invalidations, 3);
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let (cache, _) = cache(CacheOptions {
            max_entries: 2,
            ..CacheOptions::default()
        });
        cache.put("a", &1, MINUTE).await.unwrap();
        cache.put("b", &2, MINUTE).await.unwrap();
        cache.get::<i32>("a").await;
        cache.put("c", &3, MINUTE).await.unwrap();

        assert_eq!(cache.get::<i32>("a").await, Some(1));
        assert_eq!(cache.get::<i32>("b").await, None);
        assert_eq!(cache.get::<i32>("c").await, Some(3));
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn shared_hit_is_promoted() {
        let clock = Arc::new(ManualClock::new());
        let shared = Arc::new(InMemorySharedTier::with_clock(clock.clone()));
        let writer = ResultCache::with_clock(CacheOptions::default(), clock.clone())
            .with_shared_tier(shared.clone());
        let reader = ResultCache::with_clock(CacheOptions::default(), clock.clone())
            .with_shared_tier(shared.clone());

        writer.put("records:z1", &"live", MINUTE).await.unwrap();
        assert_eq!(reader.get::<String>("records:z1").await.as_deref(), Some("live"));
        assert_eq!(reader.stats().await.shared_hits, 1);
        assert_eq!(reader.stats().await.entries, 1);

        // served locally from now on
        shared.invalidate("records:").await.unwrap();
        assert_eq!(reader.get::<String>("records:z1").await.as_deref(), Some("live"));
        assert_eq!(reader.stats().await.shared_hits, 1);
    }

    struct BrokenTier;

    #[async_trait]
    impl SharedTier for BrokenTier {
        fn name(&self) -> &'static str {
            "broken"
        }
        async fn get(&self, _key: &str) -> CoreResult<Option<SharedValue>> {
            Err(CoreError::Cache("connection refused".into()))
        }
        async fn set(&self, _key: &str, _payload: &str, _ttl: Duration) -> CoreResult<()> {
            Err(CoreError::Cache("connection refused".into()))
        }
        async fn invalidate(&self, _prefix: &str) -> CoreResult<usize> {
            Err(CoreError::Cache("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn shared_failures_are_misses() {
        let cache = ResultCache::new(CacheOptions::default()).with_shared_tier(Arc::new(BrokenTier));
        assert!(cache.get::<i32>("k").await.is_none());
        cache.put("k", &5, MINUTE).await.unwrap();
        assert_eq!(cache.get::<i32>("k").await, Some(5));
        assert_eq!(cache.invalidate("k").await, 1);
    }

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CacheRefresher for CountingRefresher {
        async fn refresh(&self, key: &str) -> CoreResult<Option<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Value::String(format!("fresh {key}"))))
        }
    }

    #[tokio::test]
    async fn prefetch_refreshes_hot_entries_near_expiry() {
        let (cache, clock) = cache(CacheOptions {
            min_hits_for_extension: 1000.0,
            ..CacheOptions::default()
        });
        cache.put("hot", &"old", MINUTE).await.unwrap();
        cache.put("idle", &"old", MINUTE).await.unwrap();

        clock.advance(Duration::from_secs(30));
        cache.get::<String>("hot").await;
        assert!(cache.prefetch_candidates().await.is_empty());

        clock.advance(Duration::from_secs(20));
        // both are within the last 20%, both were accessed (or stored) within one TTL
        assert_eq!(cache.prefetch_candidates().await, ["hot", "idle"]);

        let refresher = CountingRefresher {
            calls: AtomicUsize::new(0),
        };
        assert_eq!(cache.prefetch_tick(&refresher).await, 2);
        assert_eq!(
            cache.get::<String>("hot").await.as_deref(),
            Some("fresh hot")
        );

        // refreshed entries live a full TTL again
        clock.advance(Duration::from_secs(50));
        assert!(cache.get::<String>("hot").await.is_some());
        assert_eq!(cache.stats().await.prefetches, 2);
    }

    #[tokio::test]
    async fn stale_entries_are_not_prefetched() {
        let (cache, clock) = cache(CacheOptions {
            min_hits_for_extension: 1000.0,
            ..CacheOptions::default()
        });
        cache.put("k", &1, Duration::from_secs(600)).await.unwrap();
        clock.advance(Duration::from_secs(590));
        // inside the prefetch window but last touched 590s ago, still within one TTL
        assert_eq!(cache.prefetch_candidates().await, ["k"]);

        cache.put("short", &1, MINUTE).await.unwrap();
        clock.advance(Duration::from_secs(61));
        assert!(cache.prefetch_candidates().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn prefetch_loop_stops_on_cancel() {
        let cache = Arc::new(ResultCache::new(CacheOptions::default()));
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
        });
        let cancel = CancellationToken::new();
        let handle = cache
            .clone()
            .spawn_prefetch_loop(refresher, Duration::from_secs(30), cancel.clone());

        tokio::time::sleep(Duration::from_secs(95)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
