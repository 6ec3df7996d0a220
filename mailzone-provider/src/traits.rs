use async_trait::async_trait;

use crate::error::{ProviderError, Result};
use crate::http_client::ErrorContext;
use crate::types::{
    DnsRecord, PaginatedResponse, PaginationParams, ProviderZone, RecordQueryParams,
};

/// 原始 API 错误（内部使用）
#[derive(Debug, Clone)]
pub(crate) struct RawApiError {
    /// 错误码（各 Provider 格式不同）
    pub code: Option<String>,
    /// 原始错误消息
    pub message: String,
}

impl RawApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

/// Provider 错误映射 Trait（内部使用）
/// 各 Provider 实现此 trait 以将原始 API 错误映射到统一错误类型
pub(crate) trait ProviderErrorMapper {
    /// 返回 Provider 标识符
    fn provider_name(&self) -> &'static str;

    /// 将原始 API 错误映射到统一错误类型
    fn map_error(&self, raw: RawApiError, context: &ErrorContext) -> ProviderError;

    /// 快捷方法：解析错误
    fn parse_error(&self, detail: impl ToString) -> ProviderError {
        ProviderError::ParseError {
            provider: self.provider_name().to_string(),
            detail: detail.to_string(),
        }
    }

    /// 快捷方法：未知错误（fallback）
    fn unknown_error(&self, raw: RawApiError) -> ProviderError {
        ProviderError::Unknown {
            provider: self.provider_name().to_string(),
            raw_code: raw.code,
            raw_message: raw.message,
        }
    }
}

/// Zones requested per page by [`DnsProvider::list_all_zones`].
pub const ZONE_PAGE_SIZE: u32 = 50;
/// Records requested per page by [`DnsProvider::list_all_records`].
pub const RECORD_PAGE_SIZE: u32 = 100;

/// 权威 DNS 提供商 Trait
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// 提供商标识符
    fn id(&self) -> &'static str;

    /// 验证凭证是否有效
    async fn validate_credentials(&self) -> Result<bool>;

    /// 获取 Zone 列表 (分页)
    async fn list_zones(&self, params: &PaginationParams)
    -> Result<PaginatedResponse<ProviderZone>>;

    /// 获取 DNS 记录列表 (分页 + 过滤)
    async fn list_records(
        &self,
        zone_id: &str,
        params: &RecordQueryParams,
    ) -> Result<PaginatedResponse<DnsRecord>>;

    /// 创建 DNS 记录
    async fn create_record(&self, zone_id: &str, record: &DnsRecord) -> Result<DnsRecord>;

    /// 原地更新 DNS 记录（名称、内容、TTL、优先级、代理状态）
    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<DnsRecord>;

    /// 删除 DNS 记录
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()>;

    /// 获取全部 Zone（自动翻页）
    async fn list_all_zones(&self) -> Result<Vec<ProviderZone>> {
        let mut zones = Vec::new();
        let mut page = 1;
        loop {
            let resp = self
                .list_zones(&PaginationParams {
                    page,
                    page_size: ZONE_PAGE_SIZE,
                })
                .await?;
            let exhausted = resp.items.is_empty() || !resp.has_more;
            zones.extend(resp.items);
            if exhausted {
                break;
            }
            page += 1;
        }
        log::debug!("[{}] listed {} zones", self.id(), zones.len());
        Ok(zones)
    }

    /// 获取 Zone 下全部记录（自动翻页），保留 `filter` 中的名称/类型过滤
    async fn list_all_records(
        &self,
        zone_id: &str,
        filter: &RecordQueryParams,
    ) -> Result<Vec<DnsRecord>> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let params = RecordQueryParams {
                page,
                page_size: RECORD_PAGE_SIZE,
                ..filter.clone()
            };
            let resp = self.list_records(zone_id, &params).await?;
            let exhausted = resp.items.is_empty() || !resp.has_more;
            records.extend(resp.items);
            if exhausted {
                break;
            }
            page += 1;
        }
        log::debug!(
            "[{}] listed {} records in zone {zone_id}",
            self.id(),
            records.len()
        );
        Ok(records)
    }
}
