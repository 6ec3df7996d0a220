//! Per-zone write locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// Serialises writes to the same zone; different zones proceed in parallel.
///
/// A zone's entry lives only while someone holds or waits for its lock.
#[derive(Debug, Default)]
pub struct ZoneLocks {
    locks: LockMap,
}

impl ZoneLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `zone_id`.
    pub async fn lock(&self, zone_id: &str) -> ZoneGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(zone_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        ZoneGuard {
            guard: Some(lock.lock_owned().await),
            locks: self.locks.clone(),
            zone_id: zone_id.to_string(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Exclusive access to one zone until dropped.
#[derive(Debug)]
pub struct ZoneGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: LockMap,
    zone_id: String,
}

impl Drop for ZoneGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // 只剩 map 自己持有时说明没有等待者
        if locks
            .get(&self.zone_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.zone_id);
        }
    }
}
