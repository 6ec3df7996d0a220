//! Zone 解析服务
//!
//! 将域名映射到账户下的 Provider Zone（最长后缀匹配），并缓存 Zone 列表。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use mailzone_provider::{canonical_hostname, DnsProvider};
use tokio::sync::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::traits::{Clock, SystemClock};
use crate::types::Zone;

/// Default lifetime of the account zone map.
pub const DEFAULT_ZONE_CACHE_TTL: Duration = Duration::from_secs(300);

/// Account zone map `{name -> id}` with its fetch time.
#[derive(Debug, Default)]
struct ZoneCache {
    zones: HashMap<String, String>,
    fetched: Option<(Instant, DateTime<Utc>)>,
    /// Bumped on every refresh; lets waiters skip a refresh another task just did.
    generation: u64,
}

impl ZoneCache {
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        self.fetched
            .is_some_and(|(at, _)| now.saturating_duration_since(at) < ttl)
    }

    /// Strips labels from the left until a zone matches.
    fn lookup(&self, domain: &str) -> Option<Zone> {
        let fetched_at = self.fetched.map_or_else(Utc::now, |(_, at)| at);
        let mut candidate = domain;
        loop {
            if let Some(id) = self.zones.get(candidate) {
                return Some(Zone {
                    domain: candidate.to_string(),
                    provider_zone_id: id.clone(),
                    fetched_at,
                });
            }
            let (_, parent) = candidate.split_once('.')?;
            candidate = parent;
        }
    }
}

/// Resolves domains to zones through a cached account zone map.
pub struct ZoneResolver {
    provider: Arc<dyn DnsProvider>,
    cache: RwLock<ZoneCache>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ZoneResolver {
    #[must_use]
    pub fn new(provider: Arc<dyn DnsProvider>, ttl: Duration) -> Self {
        Self::with_clock(provider, ttl, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(provider: Arc<dyn DnsProvider>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            cache: RwLock::new(ZoneCache::default()),
            clock,
            ttl,
        }
    }

    /// Longest-suffix match of `domain` against the account's zones.
    ///
    /// A miss against a fresh zone map is reported without refetching; pass
    /// `force_refresh` to pick up zones created since the last fetch.
    pub async fn resolve_zone(&self, domain: &str, force_refresh: bool) -> CoreResult<Zone> {
        let domain = canonical_hostname(domain);
        if domain.is_empty() {
            return Err(CoreError::Validation("domain is empty".to_string()));
        }

        let seen_generation = {
            let cache = self.cache.read().await;
            if !force_refresh && cache.is_fresh(self.clock.now(), self.ttl) {
                return cache
                    .lookup(&domain)
                    .ok_or(CoreError::ZoneNotFound(domain));
            }
            cache.generation
        };

        // single flight: the write lock is held for the whole fetch
        let mut cache = self.cache.write().await;
        let refreshed_meanwhile = cache.generation != seen_generation;
        if !(refreshed_meanwhile && cache.is_fresh(self.clock.now(), self.ttl)) {
            self.refresh(&mut cache).await?;
        }

        let zone = cache
            .lookup(&domain)
            .ok_or_else(|| CoreError::ZoneNotFound(domain.clone()))?;
        log::debug!(
            "[zones] {domain} -> {} ({})",
            zone.domain,
            zone.provider_zone_id
        );
        Ok(zone)
    }

    async fn refresh(&self, cache: &mut ZoneCache) -> CoreResult<()> {
        let zones = self.provider.list_all_zones().await.map_err(|e| {
            if e.is_expected() {
                log::warn!("[zones] listing zones failed: {e}");
            } else {
                log::error!("[zones] listing zones failed: {e}");
            }
            CoreError::Provider(e)
        })?;

        cache.zones = zones
            .into_iter()
            .map(|z| (canonical_hostname(&z.name), z.id))
            .collect();
        cache.fetched = Some((self.clock.now(), Utc::now()));
        cache.generation += 1;
        log::info!("[zones] cached {} zones", cache.zones.len());
        Ok(())
    }

    /// Drops the cached zone map.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.zones.clear();
        cache.fetched = None;
    }

    /// Zone id for `domain` from the cached map, without fetching.
    pub async fn cached_zone_id(&self, domain: &str) -> Option<String> {
        let cache = self.cache.read().await;
        if !cache.is_fresh(self.clock.now(), self.ttl) {
            return None;
        }
        cache
            .lookup(&canonical_hostname(domain))
            .map(|z| z.provider_zone_id)
    }
}
