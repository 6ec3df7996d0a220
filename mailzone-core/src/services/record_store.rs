//! DNS 记录存储服务
//!
//! 通过结果缓存读取 Zone 记录列表；所有写操作成功后立即失效该 Zone 的缓存。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mailzone_provider::{DnsProvider, DnsRecord, ProviderError, RecordQueryParams};
use serde_json::Value;

use crate::cache::{CacheRefresher, ResultCache};
use crate::error::{CoreError, CoreResult};

/// Default lifetime of a cached record list.
pub const DEFAULT_RECORDS_CACHE_TTL: Duration = Duration::from_secs(60);

const RECORDS_PREFIX: &str = "records:";

/// Cache key of a zone's record list.
pub fn records_cache_key(zone_id: &str) -> String {
    format!("{RECORDS_PREFIX}{zone_id}")
}

/// Result of a create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(DnsRecord),
    /// The provider already had a record with the same name, type and content.
    AlreadyPresent(DnsRecord),
}

impl CreateOutcome {
    pub fn record(&self) -> &DnsRecord {
        match self {
            Self::Created(record) | Self::AlreadyPresent(record) => record,
        }
    }
}

/// Result of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The provider no longer had the record.
    AlreadyAbsent,
}

fn log_provider_error(action: &str, zone_id: &str, e: &ProviderError) {
    if e.is_expected() {
        log::warn!("[records] {action} in zone {zone_id} failed: {e}");
    } else {
        log::error!("[records] {action} in zone {zone_id} failed: {e}");
    }
}

/// Cached access to zone records.
pub struct RecordStore {
    provider: Arc<dyn DnsProvider>,
    cache: Arc<ResultCache>,
    ttl: Duration,
}

impl RecordStore {
    #[must_use]
    pub fn new(provider: Arc<dyn DnsProvider>, cache: Arc<ResultCache>, ttl: Duration) -> Self {
        Self {
            provider,
            cache,
            ttl,
        }
    }

    /// Every record in the zone, served from the cache when possible.
    pub async fn list(&self, zone_id: &str) -> CoreResult<Vec<DnsRecord>> {
        let key = records_cache_key(zone_id);
        if let Some(records) = self.cache.get::<Vec<DnsRecord>>(&key).await {
            log::debug!("[records] cache hit for zone {zone_id}");
            return Ok(records);
        }
        let records = self.fetch(zone_id).await?;
        self.cache.put(&key, &records, self.ttl).await?;
        Ok(records)
    }

    async fn fetch(&self, zone_id: &str) -> CoreResult<Vec<DnsRecord>> {
        self.provider
            .list_all_records(zone_id, &RecordQueryParams::default())
            .await
            .map_err(|e| {
                log_provider_error("listing records", zone_id, &e);
                CoreError::Provider(e)
            })
    }

    /// Creates a record; an identical live record counts as created.
    pub async fn create(&self, zone_id: &str, record: &DnsRecord) -> CoreResult<CreateOutcome> {
        let result = match self.provider.create_record(zone_id, record).await {
            Ok(created) => Ok(CreateOutcome::Created(created)),
            Err(e @ ProviderError::RecordExists { .. }) => {
                let key = record.key();
                let live = self.fetch(zone_id).await?;
                match live.into_iter().find(|r| r.key() == key) {
                    Some(existing) => {
                        log::info!("[records] {key} in zone {zone_id} already exists");
                        Ok(CreateOutcome::AlreadyPresent(existing))
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        };
        self.finish_write("create", zone_id, result).await
    }

    pub async fn update(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> CoreResult<DnsRecord> {
        let result = self.provider.update_record(zone_id, record_id, record).await;
        self.finish_write("update", zone_id, result).await
    }

    /// Deletes a record; a record that is already gone is not an error.
    pub async fn delete(&self, zone_id: &str, record_id: &str) -> CoreResult<DeleteOutcome> {
        let result = match self.provider.delete_record(zone_id, record_id).await {
            Ok(()) => Ok(DeleteOutcome::Deleted),
            Err(ProviderError::RecordNotFound { .. }) => {
                log::info!("[records] {record_id} in zone {zone_id} was already deleted");
                Ok(DeleteOutcome::AlreadyAbsent)
            }
            Err(e) => Err(e),
        };
        self.finish_write("delete", zone_id, result).await
    }

    async fn finish_write<T>(
        &self,
        action: &str,
        zone_id: &str,
        result: Result<T, ProviderError>,
    ) -> CoreResult<T> {
        match result {
            Ok(value) => {
                self.invalidate(zone_id).await;
                Ok(value)
            }
            Err(e) => {
                log_provider_error(action, zone_id, &e);
                Err(CoreError::Provider(e))
            }
        }
    }

    pub async fn invalidate(&self, zone_id: &str) {
        self.cache.invalidate(&records_cache_key(zone_id)).await;
    }
}

#[async_trait]
impl CacheRefresher for RecordStore {
    async fn refresh(&self, key: &str) -> CoreResult<Option<Value>> {
        let Some(zone_id) = key.strip_prefix(RECORDS_PREFIX) else {
            return Ok(None);
        };
        let records = self.fetch(zone_id).await?;
        serde_json::to_value(records)
            .map(Some)
            .map_err(|e| CoreError::Cache(e.to_string()))
    }
}
