//! Cache entries and adaptive TTL arithmetic.

use std::time::{Duration, Instant};

use serde_json::Value;

use super::CacheOptions;

/// One cached value with its access history.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub stored_at: Instant,
    pub base_ttl: Duration,
    pub access_count: u64,
    pub last_access_at: Instant,
    /// Hit count decayed to `last_access_at`.
    pub decayed_hits: f64,
    /// Monotonic access tick for LRU ordering.
    pub(crate) last_tick: u64,
}

impl CacheEntry {
    pub(crate) fn new(key: String, value: Value, base_ttl: Duration, now: Instant, tick: u64) -> Self {
        Self {
            key,
            value,
            stored_at: now,
            base_ttl,
            access_count: 0,
            last_access_at: now,
            decayed_hits: 0.0,
            last_tick: tick,
        }
    }

    /// Replaces the value and restarts the lifetime, keeping the access history.
    pub(crate) fn refresh(&mut self, value: Value, base_ttl: Duration, now: Instant, tick: u64) {
        self.value = value;
        self.base_ttl = base_ttl;
        self.stored_at = now;
        self.last_tick = tick;
    }

    /// Hits decayed exponentially with the configured half-life.
    pub fn decayed_hits_at(&self, now: Instant, options: &CacheOptions) -> f64 {
        let half_life = options.decay_half_life.as_secs_f64();
        if half_life <= 0.0 {
            return self.decayed_hits;
        }
        let elapsed = now.saturating_duration_since(self.last_access_at).as_secs_f64();
        self.decayed_hits * 0.5_f64.powf(elapsed / half_life)
    }

    /// `base * min(1 + hits * boost, ceiling)` once enough hits have accumulated.
    pub fn effective_ttl(&self, now: Instant, options: &CacheOptions) -> Duration {
        let hits = self.decayed_hits_at(now, options);
        if hits < options.min_hits_for_extension {
            return self.base_ttl;
        }
        let multiplier = (1.0 + hits * options.boost_per_hit).min(options.ceiling_multiplier);
        self.base_ttl.mul_f64(multiplier.max(1.0))
    }

    pub fn remaining(&self, now: Instant, options: &CacheOptions) -> Duration {
        (self.stored_at + self.effective_ttl(now, options)).saturating_duration_since(now)
    }

    pub fn is_expired(&self, now: Instant, options: &CacheOptions) -> bool {
        self.remaining(now, options).is_zero()
    }

    pub(crate) fn record_hit(&mut self, now: Instant, tick: u64, options: &CacheOptions) {
        self.decayed_hits = self.decayed_hits_at(now, options) + 1.0;
        self.last_access_at = now;
        self.access_count += 1;
        self.last_tick = tick;
    }

    /// Close to expiry and still in use.
    pub(crate) fn wants_prefetch(&self, now: Instant, options: &CacheOptions) -> bool {
        let effective = self.effective_ttl(now, options);
        let remaining = self.remaining(now, options);
        !remaining.is_zero()
            && remaining <= effective.mul_f64(options.prefetch_fraction)
            && now.saturating_duration_since(self.last_access_at) <= effective
    }
}
