//! Engine configuration.
//!
//! Every section has defaults, so an empty TOML document is a valid configuration
//! once the API token is supplied (usually through `CLOUDFLARE_API_TOKEN`).

use std::path::Path;
use std::time::Duration;

use mailzone_provider::{ClientSettings, RetryPolicy, MAX_TTL, MIN_TTL, TTL_AUTOMATIC};
use mailzone_verifier::{ResolverEndpoint, VerifierOptions};
use serde::{Deserialize, Serialize};

use crate::cache::CacheOptions;
use crate::error::{CoreError, CoreResult};

/// API token variable; takes precedence over the file.
pub const ENV_API_TOKEN: &str = "CLOUDFLARE_API_TOKEN";
/// Redis URL of the shared cache tier.
pub const ENV_REDIS_URL: &str = "MAILZONE_REDIS_URL";
/// Override of the provider API endpoint.
pub const ENV_API_BASE: &str = "MAILZONE_API_BASE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub api: ApiConfig,
    pub zones: ZonesConfig,
    pub records: RecordsConfig,
    pub dns: DnsConfig,
    pub cache: CacheConfig,
    pub propagation: PropagationConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub token: Option<String>,
    pub base_url: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: mailzone_provider::DEFAULT_CAPACITY,
            refill_per_sec: mailzone_provider::DEFAULT_REFILL_PER_SEC,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: duration_ms(policy.base_delay),
            max_delay_ms: duration_ms(policy.max_delay),
            jitter: policy.jitter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZonesConfig {
    pub cache_ttl_secs: u64,
}

impl Default for ZonesConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordsConfig {
    pub cache_ttl_secs: u64,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    /// TTL for template records that do not set one.
    pub default_ttl: u32,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self { default_ttl: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub boost_per_hit: f64,
    pub ceiling_multiplier: f64,
    pub decay_half_life_secs: u64,
    pub min_hits_for_extension: f64,
    pub prefetch_fraction: f64,
    pub prefetch_interval_secs: u64,
    /// Shared tier; requires the `redis` feature.
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let options = CacheOptions::default();
        Self {
            max_entries: options.max_entries,
            boost_per_hit: options.boost_per_hit,
            ceiling_multiplier: options.ceiling_multiplier,
            decay_half_life_secs: options.decay_half_life.as_secs(),
            min_hits_for_extension: options.min_hits_for_extension,
            prefetch_fraction: options.prefetch_fraction,
            prefetch_interval_secs: 30,
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub query_timeout_ms: u64,
    pub convergence_threshold: f64,
    pub min_quorum: usize,
    pub min_observation_window_secs: u64,
    pub max_wait_secs: u64,
    pub initial_interval_secs: u64,
    pub max_interval_secs: u64,
    /// Empty means the built-in public resolver panel.
    pub resolvers: Vec<ResolverEndpoint>,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        let options = VerifierOptions::default();
        Self {
            query_timeout_ms: duration_ms(options.query_timeout),
            convergence_threshold: options.convergence_threshold,
            min_quorum: options.min_quorum,
            min_observation_window_secs: options.min_observation_window.as_secs(),
            max_wait_secs: options.max_wait.as_secs(),
            initial_interval_secs: options.initial_interval.as_secs(),
            max_interval_secs: options.max_interval.as_secs(),
            resolvers: Vec::new(),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl EngineConfig {
    pub fn from_toml_str(source: &str) -> CoreResult<Self> {
        toml::from_str(source).map_err(|e| CoreError::Config(format!("invalid TOML: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&source)?;
        log::debug!("[config] loaded {}", path.display());
        Ok(config)
    }

    /// Applies `CLOUDFLARE_API_TOKEN`, `MAILZONE_REDIS_URL` and `MAILZONE_API_BASE`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Same as [`Self::apply_env_overrides`] with a custom variable source.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = non_empty(ENV_API_TOKEN) {
            self.api.token = Some(token);
        }
        if let Some(url) = non_empty(ENV_REDIS_URL) {
            self.cache.redis_url = Some(url);
        }
        if let Some(base) = non_empty(ENV_API_BASE) {
            self.api.base_url = Some(base);
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        let fail = |msg: String| Err(CoreError::Config(msg));

        if self.api.token.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return fail(format!("api.token is missing (set {ENV_API_TOKEN})"));
        }
        if self.api.rate_limit.capacity == 0 {
            return fail("api.rate_limit.capacity must be positive".to_string());
        }
        let refill = self.api.rate_limit.refill_per_sec;
        if refill.is_nan() || refill <= 0.0 {
            return fail("api.rate_limit.refill_per_sec must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.api.retry.jitter) {
            return fail("api.retry.jitter must be within [0, 1]".to_string());
        }
        let ttl = self.dns.default_ttl;
        if ttl != TTL_AUTOMATIC && !(MIN_TTL..=MAX_TTL).contains(&ttl) {
            return fail(format!(
                "dns.default_ttl must be {TTL_AUTOMATIC} or within {MIN_TTL}..={MAX_TTL}"
            ));
        }
        if self.cache.max_entries == 0 {
            return fail("cache.max_entries must be positive".to_string());
        }
        if self.cache.ceiling_multiplier < 1.0 {
            return fail("cache.ceiling_multiplier must be at least 1".to_string());
        }
        if !(self.cache.prefetch_fraction > 0.0 && self.cache.prefetch_fraction < 1.0) {
            return fail("cache.prefetch_fraction must be within (0, 1)".to_string());
        }
        if self.cache.prefetch_interval_secs == 0 {
            return fail("cache.prefetch_interval_secs must be positive".to_string());
        }

        let p = &self.propagation;
        if !(p.convergence_threshold > 0.0 && p.convergence_threshold <= 1.0) {
            return fail("propagation.convergence_threshold must be within (0, 1]".to_string());
        }
        if p.min_quorum == 0 {
            return fail("propagation.min_quorum must be positive".to_string());
        }
        if p.min_observation_window_secs > p.max_wait_secs {
            return fail(
                "propagation.min_observation_window_secs exceeds max_wait_secs".to_string(),
            );
        }
        if p.query_timeout_ms == 0 || p.initial_interval_secs == 0 || p.max_interval_secs == 0 {
            return fail("propagation timeouts and intervals must be positive".to_string());
        }
        Ok(())
    }

    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.api.base_url.clone(),
            capacity: self.api.rate_limit.capacity,
            refill_per_sec: self.api.rate_limit.refill_per_sec,
            retry: RetryPolicy {
                max_retries: self.api.retry.max_retries,
                base_delay: Duration::from_millis(self.api.retry.base_delay_ms),
                max_delay: Duration::from_millis(self.api.retry.max_delay_ms),
                jitter: self.api.retry.jitter,
            },
            observer: None,
        }
    }

    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions {
            max_entries: self.cache.max_entries,
            boost_per_hit: self.cache.boost_per_hit,
            ceiling_multiplier: self.cache.ceiling_multiplier,
            decay_half_life: Duration::from_secs(self.cache.decay_half_life_secs),
            min_hits_for_extension: self.cache.min_hits_for_extension,
            prefetch_fraction: self.cache.prefetch_fraction,
        }
    }

    pub fn verifier_options(&self) -> VerifierOptions {
        let p = &self.propagation;
        VerifierOptions {
            query_timeout: Duration::from_millis(p.query_timeout_ms),
            convergence_threshold: p.convergence_threshold,
            min_quorum: p.min_quorum,
            min_observation_window: Duration::from_secs(p.min_observation_window_secs),
            max_wait: Duration::from_secs(p.max_wait_secs),
            initial_interval: Duration::from_secs(p.initial_interval_secs),
            max_interval: Duration::from_secs(p.max_interval_secs),
        }
    }

    pub fn zone_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.zones.cache_ttl_secs)
    }

    pub fn records_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.records.cache_ttl_secs)
    }

    pub fn prefetch_interval(&self) -> Duration {
        Duration::from_secs(self.cache.prefetch_interval_secs)
    }
}
