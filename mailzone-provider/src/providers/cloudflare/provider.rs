//! Cloudflare DnsProvider trait 实现

use async_trait::async_trait;

use crate::error::{ErrorClass, Result};
use crate::http_client::{ApiRequest, ErrorContext};
use crate::providers::common::normalize_domain_name;
use crate::traits::{DnsProvider, ProviderErrorMapper};
use crate::types::{
    DnsRecord, DnsRecordType, PaginatedResponse, PaginationParams, ProviderZone, RecordData,
    RecordQueryParams, ZoneStatus, canonical_txt,
};

use super::types::CloudflareResultInfo;
use super::{
    CloudflareCaaData, CloudflareDeleted, CloudflareDnsRecord, CloudflareProvider,
    CloudflareRecordBody, CloudflareRecordData, CloudflareSrvData, CloudflareTokenStatus, CloudflareZone,
    MAX_PAGE_SIZE_RECORDS, MAX_PAGE_SIZE_ZONES,
};

/// 优先使用 `total_pages`，否则退回 `total_count`
fn page_of<T>(
    items: Vec<T>,
    page: u32,
    page_size: u32,
    info: Option<CloudflareResultInfo>,
) -> PaginatedResponse<T> {
    match info {
        Some(CloudflareResultInfo {
            total_pages: Some(total_pages),
            ..
        }) => PaginatedResponse::from_total_pages(items, page, page_size, total_pages),
        Some(info) => PaginatedResponse::new(items, page, page_size, info.total_count),
        None => {
            let count = u32::try_from(items.len()).unwrap_or(u32::MAX);
            PaginatedResponse::new(items, page, page_size, count)
        }
    }
}

fn records_path(zone_id: &str) -> String {
    format!("/zones/{}/dns_records", urlencoding::encode(zone_id))
}

fn record_path(zone_id: &str, record_id: &str) -> String {
    format!(
        "{}/{}",
        records_path(zone_id),
        urlencoding::encode(record_id)
    )
}

impl CloudflareProvider {
    /// 将 Cloudflare zone 转换为 `ProviderZone`
    /// Cloudflare 状态：active, pending, initializing, moved, deactivated
    pub(crate) fn convert_zone(zone: CloudflareZone) -> ProviderZone {
        let status = match zone.status.as_str() {
            "active" => ZoneStatus::Active,
            "pending" | "initializing" => ZoneStatus::Pending,
            "moved" | "deactivated" | "paused" => ZoneStatus::Inactive,
            _ => ZoneStatus::Unknown,
        };

        ProviderZone {
            id: zone.id,
            name: normalize_domain_name(&zone.name),
            status,
        }
    }

    /// 将 Cloudflare 记录转换为 `DnsRecord`
    ///
    /// 返回 `None` 表示该记录类型不在受管范围内（如 PTR、HTTPS）。
    pub(crate) fn convert_record(&self, cf: CloudflareDnsRecord) -> Result<Option<DnsRecord>> {
        let Some(record_type) = DnsRecordType::parse(&cf.record_type) else {
            log::debug!(
                "[cloudflare] skipping unmanaged {} record {}",
                cf.record_type,
                cf.name
            );
            return Ok(None);
        };

        let data = match record_type {
            DnsRecordType::A => RecordData::A {
                address: cf.content,
            },
            DnsRecordType::Aaaa => RecordData::AAAA {
                address: cf.content,
            },
            DnsRecordType::Cname => RecordData::CNAME { target: cf.content },
            DnsRecordType::Ns => RecordData::NS {
                nameserver: cf.content,
            },
            DnsRecordType::Txt => RecordData::TXT {
                text: canonical_txt(&cf.content),
            },
            DnsRecordType::Mx => RecordData::MX {
                priority: cf.priority.ok_or_else(|| {
                    self.errors
                        .parse_error(format!("MX record {} has no priority", cf.id))
                })?,
                exchange: cf.content,
            },
            DnsRecordType::Srv => self.srv_data(&cf)?,
            DnsRecordType::Caa => self.caa_data(&cf)?,
        };

        Ok(Some(DnsRecord {
            id: Some(cf.id),
            name: normalize_domain_name(&cf.name),
            ttl: cf.ttl,
            data,
            proxied: cf.proxied,
            created_at: cf.created_on,
            updated_at: cf.modified_on,
        }))
    }

    fn srv_data(&self, cf: &CloudflareDnsRecord) -> Result<RecordData> {
        if let Some(data) = &cf.data {
            let srv: CloudflareSrvData = serde_json::from_value(data.clone())
                .map_err(|e| self.errors.parse_error(format!("SRV data: {e}")))?;
            return Ok(RecordData::SRV {
                priority: srv.priority,
                weight: srv.weight,
                port: srv.port,
                target: srv.target,
            });
        }

        // content 形如 "weight port target"，priority 单独给出
        let parts: Vec<&str> = cf.content.split_whitespace().collect();
        match (cf.priority, parts.as_slice()) {
            (Some(priority), [weight, port, target]) => Ok(RecordData::SRV {
                priority,
                weight: weight
                    .parse()
                    .map_err(|e| self.errors.parse_error(format!("SRV weight: {e}")))?,
                port: port
                    .parse()
                    .map_err(|e| self.errors.parse_error(format!("SRV port: {e}")))?,
                target: (*target).to_string(),
            }),
            _ => Err(self
                .errors
                .parse_error(format!("unrecognised SRV content '{}'", cf.content))),
        }
    }

    fn caa_data(&self, cf: &CloudflareDnsRecord) -> Result<RecordData> {
        if let Some(data) = &cf.data {
            let caa: CloudflareCaaData = serde_json::from_value(data.clone())
                .map_err(|e| self.errors.parse_error(format!("CAA data: {e}")))?;
            return Ok(RecordData::CAA {
                flags: caa.flags,
                tag: caa.tag,
                value: caa.value,
            });
        }

        // content 形如 `0 issue "letsencrypt.org"`
        let mut parts = cf.content.splitn(3, ' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(flags), Some(tag), Some(value)) => Ok(RecordData::CAA {
                flags: flags
                    .parse()
                    .map_err(|e| self.errors.parse_error(format!("CAA flags: {e}")))?,
                tag: tag.to_string(),
                value: value.trim().trim_matches('"').to_string(),
            }),
            _ => Err(self
                .errors
                .parse_error(format!("unrecognised CAA content '{}'", cf.content))),
        }
    }

    /// 构建创建/更新请求体
    pub(crate) fn record_body(record: &DnsRecord) -> CloudflareRecordBody {
        let mut body = CloudflareRecordBody {
            record_type: record.record_type().as_str(),
            name: normalize_domain_name(&record.name),
            content: None,
            ttl: record.ttl,
            priority: None,
            proxied: None,
            data: None,
        };

        match &record.data {
            RecordData::A { address } | RecordData::AAAA { address } => {
                body.content = Some(address.trim().to_string());
                body.proxied = record.proxied;
            }
            RecordData::CNAME { target } => {
                body.content = Some(normalize_domain_name(target));
                body.proxied = record.proxied;
            }
            RecordData::NS { nameserver } => {
                body.content = Some(normalize_domain_name(nameserver));
            }
            RecordData::TXT { text } => {
                body.content = Some(canonical_txt(text));
            }
            RecordData::MX { priority, exchange } => {
                body.content = Some(normalize_domain_name(exchange));
                body.priority = Some(*priority);
            }
            RecordData::SRV {
                priority,
                weight,
                port,
                target,
            } => {
                body.data = Some(CloudflareRecordData::Srv(CloudflareSrvData {
                    priority: *priority,
                    weight: *weight,
                    port: *port,
                    target: normalize_domain_name(target),
                }));
            }
            RecordData::CAA { flags, tag, value } => {
                body.data = Some(CloudflareRecordData::Caa(CloudflareCaaData {
                    flags: *flags,
                    tag: tag.to_ascii_lowercase(),
                    value: value.clone(),
                }));
            }
        }

        body
    }

    fn body_json(&self, record: &DnsRecord) -> Result<serde_json::Value> {
        serde_json::to_value(Self::record_body(record)).map_err(|e| {
            crate::error::ProviderError::SerializationError {
                provider: self.errors.provider_name().to_string(),
                detail: e.to_string(),
            }
        })
    }

    fn single_record(&self, cf: CloudflareDnsRecord) -> Result<DnsRecord> {
        let id = cf.id.clone();
        self.convert_record(cf)?.ok_or_else(|| {
            self.errors
                .parse_error(format!("record {id} came back with an unmanaged type"))
        })
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    fn id(&self) -> &'static str {
        "cloudflare"
    }

    async fn validate_credentials(&self) -> Result<bool> {
        match self
            .call_result::<CloudflareTokenStatus>(&ApiRequest::get("/user/tokens/verify"))
            .await
        {
            Ok(token) => Ok(token.status == "active"),
            Err(e) if e.class() == ErrorClass::Auth => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn list_zones(
        &self,
        params: &PaginationParams,
    ) -> Result<PaginatedResponse<ProviderZone>> {
        let params = params.validated(MAX_PAGE_SIZE_ZONES);
        let request = ApiRequest::get("/zones")
            .with_query("page", params.page)
            .with_query("per_page", params.page_size);

        let (zones, info): (Vec<CloudflareZone>, _) = self.call(&request).await?;
        let zones: Vec<ProviderZone> = zones.into_iter().map(Self::convert_zone).collect();

        Ok(page_of(zones, params.page, params.page_size, info))
    }

    async fn list_records(
        &self,
        zone_id: &str,
        params: &RecordQueryParams,
    ) -> Result<PaginatedResponse<DnsRecord>> {
        let params = params.validated(MAX_PAGE_SIZE_RECORDS);
        let mut request = ApiRequest::get(records_path(zone_id))
            .with_query("page", params.page)
            .with_query("per_page", params.page_size)
            .with_context(ErrorContext {
                domain: Some(zone_id.to_string()),
                ..ErrorContext::default()
            });
        if let Some(name) = &params.name {
            request = request.with_query("name", normalize_domain_name(name));
        }
        if let Some(record_type) = params.record_type {
            request = request.with_query("type", record_type);
        }

        let (cf_records, info): (Vec<CloudflareDnsRecord>, _) = self.call(&request).await?;

        let mut records = Vec::with_capacity(cf_records.len());
        for cf in cf_records {
            if let Some(record) = self.convert_record(cf)? {
                records.push(record);
            }
        }

        Ok(page_of(records, params.page, params.page_size, info))
    }

    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<DnsRecord> {
        let request = ApiRequest::post(records_path(zone_id), self.body_json(record)?).with_context(
            ErrorContext {
                record_name: Some(record.name.clone()),
                record_id: None,
                domain: Some(zone_id.to_string()),
            },
        );
        let cf: CloudflareDnsRecord = self.call_result(&request).await?;
        log::info!("[cloudflare] created {} in zone {zone_id}", record.key());
        self.single_record(cf)
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<DnsRecord> {
        let request = ApiRequest::patch(record_path(zone_id, record_id), self.body_json(record)?)
            .with_context(ErrorContext {
                record_name: Some(record.name.clone()),
                record_id: Some(record_id.to_string()),
                domain: Some(zone_id.to_string()),
            });
        let cf: CloudflareDnsRecord = self.call_result(&request).await?;
        log::info!(
            "[cloudflare] updated {record_id} to {} in zone {zone_id}",
            record.key()
        );
        self.single_record(cf)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        let request = ApiRequest::delete(record_path(zone_id, record_id)).with_context(
            ErrorContext {
                record_name: None,
                record_id: Some(record_id.to_string()),
                domain: Some(zone_id.to_string()),
            },
        );
        let _: CloudflareDeleted = self.call_result(&request).await?;
        log::info!("[cloudflare] deleted {record_id} in zone {zone_id}");
        Ok(())
    }
}
