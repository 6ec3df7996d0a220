//! 测试辅助模块
//!
//! 提供内存版 DNS Provider（可注入错误、记录调用次数）以及常用的记录工厂方法。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mailzone_provider::{
    DnsProvider, DnsRecord, PaginatedResponse, PaginationParams, ProviderError, ProviderZone,
    RecordData, RecordQueryParams, Result, ZoneStatus, TTL_AUTOMATIC,
};
use tokio::sync::RwLock;

use crate::types::Zone;

const PROVIDER: &str = "mock";

/// Provider operations that can be counted and failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    ListZones,
    ListRecords,
    Create,
    Update,
    Delete,
}

struct Injected {
    op: MockOp,
    /// Only fails calls whose record content contains this text.
    content: Option<String>,
    error: ProviderError,
}

// ===== MockDnsProvider =====

pub struct MockDnsProvider {
    zones: RwLock<Vec<ProviderZone>>,
    records: RwLock<HashMap<String, Vec<DnsRecord>>>,
    failures: RwLock<Vec<Injected>>,
    calls: RwLock<HashMap<MockOp, usize>>,
    next_id: AtomicU64,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDnsProvider {
    pub fn new() -> Self {
        Self {
            zones: RwLock::new(Vec::new()),
            records: RwLock::new(HashMap::new()),
            failures: RwLock::new(Vec::new()),
            calls: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every call sleeps for `delay` (use with paused time).
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn add_zone(&self, name: &str, id: &str) {
        self.zones.write().await.push(ProviderZone {
            id: id.to_string(),
            name: name.to_string(),
            status: ZoneStatus::Active,
        });
    }

    /// Seeds a live record; returns its id.
    pub async fn add_record(&self, zone_id: &str, record: DnsRecord) -> String {
        let id = self.allocate_id();
        self.records
            .write()
            .await
            .entry(zone_id.to_string())
            .or_default()
            .push(record.with_id(id.clone()));
        id
    }

    pub async fn records(&self, zone_id: &str) -> Vec<DnsRecord> {
        self.records
            .read()
            .await
            .get(zone_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Removes a live record behind the engine's back.
    pub async fn remove_record(&self, zone_id: &str, record_id: &str) {
        if let Some(records) = self.records.write().await.get_mut(zone_id) {
            records.retain(|r| r.id.as_deref() != Some(record_id));
        }
    }

    /// Fails the next call of `op` with `error`.
    pub async fn fail_next(&self, op: MockOp, error: ProviderError) {
        self.failures.write().await.push(Injected {
            op,
            content: None,
            error,
        });
    }

    /// Fails the next call of `op` whose record content contains `content`.
    pub async fn fail_next_matching(&self, op: MockOp, content: &str, error: ProviderError) {
        self.failures.write().await.push(Injected {
            op,
            content: Some(content.to_string()),
            error,
        });
    }

    pub async fn calls(&self, op: MockOp) -> usize {
        self.calls.read().await.get(&op).copied().unwrap_or(0)
    }

    /// Highest number of calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("rec-{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn enter(&self, op: MockOp, content: Option<&str>) -> Result<()> {
        *self.calls.write().await.entry(op).or_insert(0) += 1;

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut failures = self.failures.write().await;
        let hit = failures.iter().position(|f| {
            f.op == op
                && match (&f.content, content) {
                    (None, _) => true,
                    (Some(wanted), Some(actual)) => actual.contains(wanted.as_str()),
                    (Some(_), None) => false,
                }
        });
        match hit {
            Some(i) => Err(failures.remove(i).error),
            None => Ok(()),
        }
    }
}

impl Default for MockDnsProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DnsProvider for MockDnsProvider {
    fn id(&self) -> &'static str {
        PROVIDER
    }

    async fn validate_credentials(&self) -> Result<bool> {
        Ok(true)
    }

    async fn list_zones(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<ProviderZone>> {
        self.enter(MockOp::ListZones, None).await?;
        let params = params.validated(50);
        let zones = self.zones.read().await;
        Ok(page_of(&zones, params.page, params.page_size))
    }

    async fn list_records(
        &self,
        zone_id: &str,
        params: &RecordQueryParams,
    ) -> Result<PaginatedResponse<DnsRecord>> {
        self.enter(MockOp::ListRecords, None).await?;
        let records = self.records.read().await;
        let Some(records) = records.get(zone_id) else {
            if self.zones.read().await.iter().any(|z| z.id == zone_id) {
                return Ok(PaginatedResponse::new(Vec::new(), params.page, params.page_size, 0));
            }
            return Err(ProviderError::DomainNotFound {
                provider: PROVIDER.to_string(),
                domain: zone_id.to_string(),
                raw_message: None,
            });
        };
        let filtered: Vec<DnsRecord> = records
            .iter()
            .filter(|r| params.name.as_ref().is_none_or(|n| &r.name == n))
            .filter(|r| params.record_type.is_none_or(|t| r.record_type() == t))
            .cloned()
            .collect();
        let params = params.validated(100);
        Ok(page_of(&filtered, params.page, params.page_size))
    }

    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<DnsRecord> {
        self.enter(MockOp::Create, Some(&record.data.content())).await?;
        let mut all = self.records.write().await;
        let records = all.entry(zone_id.to_string()).or_default();
        if records.iter().any(|r| r.key() == record.key()) {
            return Err(ProviderError::RecordExists {
                provider: PROVIDER.to_string(),
                record_name: record.name.clone(),
                raw_message: None,
            });
        }
        let mut created = record.clone().with_id(self.allocate_id());
        created.created_at = Some(Utc::now());
        if created.proxied == Some(true) {
            created.ttl = TTL_AUTOMATIC;
        }
        records.push(created.clone());
        Ok(created)
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<DnsRecord> {
        self.enter(MockOp::Update, Some(&record.data.content())).await?;
        let mut all = self.records.write().await;
        let existing = all
            .get_mut(zone_id)
            .and_then(|records| records.iter_mut().find(|r| r.id.as_deref() == Some(record_id)))
            .ok_or_else(|| record_not_found(record_id))?;
        let mut updated = record.clone().with_id(record_id);
        updated.proxied = record.proxied.or(existing.proxied);
        if updated.proxied == Some(true) {
            updated.ttl = TTL_AUTOMATIC;
        }
        updated.updated_at = Some(Utc::now());
        *existing = updated.clone();
        Ok(updated)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        self.enter(MockOp::Delete, None).await?;
        let mut all = self.records.write().await;
        let records = all
            .get_mut(zone_id)
            .ok_or_else(|| record_not_found(record_id))?;
        let before = records.len();
        records.retain(|r| r.id.as_deref() != Some(record_id));
        if records.len() == before {
            return Err(record_not_found(record_id));
        }
        Ok(())
    }
}

fn page_of<T: Clone>(items: &[T], page: u32, page_size: u32) -> PaginatedResponse<T> {
    let start = ((page - 1) * page_size) as usize;
    let slice: Vec<T> = items.iter().skip(start).take(page_size as usize).cloned().collect();
    let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
    PaginatedResponse::new(slice, page, page_size, total)
}

// ===== 错误工厂 =====

pub fn record_not_found(record_id: &str) -> ProviderError {
    ProviderError::RecordNotFound {
        provider: PROVIDER.to_string(),
        record_id: record_id.to_string(),
        raw_message: None,
    }
}

pub fn network_error() -> ProviderError {
    ProviderError::NetworkError {
        provider: PROVIDER.to_string(),
        detail: "connection reset".to_string(),
    }
}

pub fn invalid_parameter(detail: &str) -> ProviderError {
    ProviderError::InvalidParameter {
        provider: PROVIDER.to_string(),
        param: "content".to_string(),
        detail: detail.to_string(),
    }
}

// ===== 记录工厂 =====

pub fn a_record(name: &str, address: &str) -> DnsRecord {
    DnsRecord::new(
        name,
        300,
        RecordData::A {
            address: address.to_string(),
        },
    )
}

pub fn mx_record(name: &str, priority: u16, exchange: &str) -> DnsRecord {
    DnsRecord::new(
        name,
        300,
        RecordData::MX {
            priority,
            exchange: exchange.to_string(),
        },
    )
}

pub fn txt_record(name: &str, text: &str) -> DnsRecord {
    DnsRecord::new(
        name,
        300,
        RecordData::TXT {
            text: text.to_string(),
        },
    )
}

pub fn cname_record(name: &str, target: &str) -> DnsRecord {
    DnsRecord::new(
        name,
        300,
        RecordData::CNAME {
            target: target.to_string(),
        },
    )
}

pub fn zone(domain: &str, id: &str) -> Zone {
    Zone {
        domain: domain.to_string(),
        provider_zone_id: id.to_string(),
        fetched_at: Utc::now(),
    }
}

/// Mock provider holding `example.com` as zone `z1`.
pub async fn example_provider() -> Arc<MockDnsProvider> {
    let provider = Arc::new(MockDnsProvider::new());
    provider.add_zone("example.com", "z1").await;
    provider
}
