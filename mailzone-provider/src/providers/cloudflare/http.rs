//! Cloudflare 信封解析（基于共享的 `ApiClient`）

use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::http_client::ApiRequest;
use crate::traits::{ProviderErrorMapper, RawApiError};

use super::types::CloudflareResultInfo;
use super::{CloudflareProvider, CloudflareResponse};

impl CloudflareProvider {
    /// 执行请求并解包 `result`，同时返回分页信息
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<(T, Option<CloudflareResultInfo>)> {
        let response = self.client.execute(request).await?;
        let envelope: CloudflareResponse<T> = response.json()?;

        // 2xx 也可能带 success=false
        if !envelope.success {
            let raw = envelope.errors.into_iter().next().map_or_else(
                || RawApiError::new("Unknown error"),
                |e| RawApiError::with_code(e.code.to_string(), e.message),
            );
            log::warn!("[cloudflare] API error: {}", raw.message);
            return Err(self.errors.map_error(raw, &request.context));
        }

        let result = envelope
            .result
            .ok_or_else(|| self.errors.parse_error("response is missing the result field"))?;
        Ok((result, envelope.result_info))
    }

    /// 执行请求并仅返回 `result`
    pub(crate) async fn call_result<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        self.call(request).await.map(|(result, _)| result)
    }
}
