//! Provider 公共工具函数

use std::time::Duration;

use reqwest::Client;

use crate::error::{ProviderError, Result};
use crate::types::canonical_hostname;

// ============ HTTP Client ============

/// 默认连接超时（秒）
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// 默认请求超时（秒）
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// 创建带超时配置的 HTTP Client
pub fn create_http_client(provider: &str) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| ProviderError::NetworkError {
            provider: provider.to_string(),
            detail: format!("Failed to create HTTP client: {e}"),
        })
}

// ============ 域名名称处理 ============

/// 去掉域名末尾的点并转为小写
pub fn normalize_domain_name(name: &str) -> String {
    canonical_hostname(name)
}

/// 将相对名称转换为完整域名
/// 如: "www" + "example.com" -> "www.example.com"
/// 如: "@" + "example.com" -> "example.com"
/// 已经位于 zone 之下的名称（或以 "." 结尾的绝对名称）保持不变
pub fn relative_to_full_name(relative_name: &str, zone_name: &str) -> String {
    let zone = normalize_domain_name(zone_name);
    let trimmed = relative_name.trim();

    if trimmed == "@" || trimmed.is_empty() {
        return zone;
    }
    if trimmed.ends_with('.') {
        return normalize_domain_name(trimmed);
    }
    let name = normalize_domain_name(trimmed);
    if name == zone || name.ends_with(&format!(".{zone}")) {
        name
    } else {
        format!("{name}.{zone}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_names() {
        assert_eq!(relative_to_full_name("@", "example.com"), "example.com");
        assert_eq!(relative_to_full_name("mail", "example.com"), "mail.example.com");
        assert_eq!(
            relative_to_full_name("_dmarc.Example.com", "example.com"),
            "_dmarc.example.com"
        );
        assert_eq!(
            relative_to_full_name("mx.provider.net.", "example.com"),
            "mx.provider.net"
        );
    }
}
