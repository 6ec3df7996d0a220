//! Shared cache tier abstract Trait

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CoreResult;
use crate::traits::{Clock, SystemClock};

/// A payload read from the shared tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedValue {
    /// Serialized JSON value.
    pub payload: String,
    /// Remaining lifetime, when the tier knows it.
    pub ttl: Option<Duration>,
}

/// Cache tier shared between engine instances.
///
/// Only consulted on a local miss. Implementations report failures as errors;
/// the result cache logs them and treats them as misses.
#[async_trait]
pub trait SharedTier: Send + Sync {
    /// Tier name for logs
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> CoreResult<Option<SharedValue>>;

    async fn set(&self, key: &str, payload: &str, ttl: Duration) -> CoreResult<()>;

    /// Removes `prefix` itself and every key starting with it. Returns the number removed.
    async fn invalidate(&self, prefix: &str) -> CoreResult<usize>;
}

/// In-memory shared tier
///
/// Share one instance between several result caches to emulate a shared store.
#[derive(Debug, Clone)]
pub struct InMemorySharedTier {
    entries: Arc<RwLock<HashMap<String, (String, Instant)>>>,
    clock: Arc<dyn Clock>,
}

impl InMemorySharedTier {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemorySharedTier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedTier for InMemorySharedTier {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> CoreResult<Option<SharedValue>> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some((payload, expires_at)) if *expires_at > now => Ok(Some(SharedValue {
                payload: payload.clone(),
                ttl: Some(*expires_at - now),
            })),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, payload: &str, ttl: Duration) -> CoreResult<()> {
        let expires_at = self.clock.now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (payload.to_string(), expires_at));
        Ok(())
    }

    async fn invalidate(&self, prefix: &str) -> CoreResult<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }
}
