//! Redis-backed shared tier.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::{CoreError, CoreResult};
use crate::traits::{SharedTier, SharedValue};

const DEFAULT_NAMESPACE: &str = "mailzone:";
const SCAN_BATCH: usize = 200;

/// Shared tier stored in Redis under a key namespace.
#[derive(Clone)]
pub struct RedisTier {
    conn: ConnectionManager,
    namespace: String,
}

impl std::fmt::Debug for RedisTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTier")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

fn cache_error(op: &str, e: &redis::RedisError) -> CoreError {
    CoreError::Cache(format!("redis {op} failed: {e}"))
}

/// Escapes glob metacharacters for `SCAN MATCH`.
fn escape_pattern(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl RedisTier {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> CoreResult<Self> {
        let client = redis::Client::open(url).map_err(|e| cache_error("open", &e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| cache_error("connect", &e))?;
        log::info!("[cache] connected shared tier to redis");
        Ok(Self {
            conn,
            namespace: DEFAULT_NAMESPACE.to_string(),
        })
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.namespace)
    }
}

#[async_trait]
impl SharedTier for RedisTier {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> CoreResult<Option<SharedValue>> {
        let mut conn = self.conn.clone();
        let full = self.key(key);
        let payload: Option<String> = conn.get(&full).await.map_err(|e| cache_error("GET", &e))?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let pttl: i64 = redis::cmd("PTTL")
            .arg(&full)
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error("PTTL", &e))?;
        let ttl = u64::try_from(pttl).ok().map(Duration::from_millis);
        Ok(Some(SharedValue { payload, ttl }))
    }

    async fn set(&self, key: &str, payload: &str, ttl: Duration) -> CoreResult<()> {
        let mut conn = self.conn.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(payload)
            .arg("PX")
            .arg(millis)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| cache_error("SET", &e))
    }

    async fn invalidate(&self, prefix: &str) -> CoreResult<usize> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", escape_pattern(&self.key(prefix)));
        let mut cursor: u64 = 0;
        let mut removed = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(|e| cache_error("SCAN", &e))?;
            if !keys.is_empty() {
                let n: usize = conn.del(&keys).await.map_err(|e| cache_error("DEL", &e))?;
                removed += n;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_glob_characters() {
        assert_eq!(escape_pattern("mailzone:records:z1"), "mailzone:records:z1");
        assert_eq!(escape_pattern("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }
}
