//! Cloudflare DNS Provider

mod error;
mod http;
mod provider;
mod types;

use std::sync::Arc;

use crate::error::Result;
use crate::http_client::{ApiClient, ClientSettings};
use crate::rate_limiter::TokenBucket;

pub(crate) use error::CloudflareErrorMapper;
pub(crate) use types::{
    CloudflareCaaData, CloudflareDeleted, CloudflareDnsRecord, CloudflareRecordBody,
    CloudflareRecordData, CloudflareResponse, CloudflareSrvData, CloudflareTokenStatus, CloudflareZone,
};

pub const CF_API_BASE: &str = "https://api.cloudflare.com/client/v4";
/// Cloudflare Zones API 单页最大记录数
pub(crate) const MAX_PAGE_SIZE_ZONES: u32 = 50;
/// Cloudflare DNS Records API 单页最大记录数
pub(crate) const MAX_PAGE_SIZE_RECORDS: u32 = 100;

/// Cloudflare DNS Provider
#[derive(Debug)]
pub struct CloudflareProvider {
    pub(crate) client: ApiClient,
    pub(crate) errors: CloudflareErrorMapper,
}

impl CloudflareProvider {
    /// Provider with default rate limits and retry policy against the public API.
    pub fn new(api_token: impl Into<String>) -> Result<Self> {
        Self::with_settings(api_token, &ClientSettings::default())
    }

    pub fn with_settings(api_token: impl Into<String>, settings: &ClientSettings) -> Result<Self> {
        let base_url = settings.base_url.as_deref().unwrap_or(CF_API_BASE);
        let client = ApiClient::new(
            "cloudflare",
            base_url,
            api_token,
            Arc::new(TokenBucket::new(settings.capacity, settings.refill_per_sec)),
            settings.retry.clone(),
            Arc::new(CloudflareErrorMapper),
        )?;
        let client = match &settings.observer {
            Some(observer) => client.with_observer(Arc::clone(observer)),
            None => client,
        };
        Ok(Self::with_client(client))
    }

    pub(crate) fn with_client(client: ApiClient) -> Self {
        Self {
            client,
            errors: CloudflareErrorMapper,
        }
    }
}
