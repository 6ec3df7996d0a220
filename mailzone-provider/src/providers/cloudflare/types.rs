//! Cloudflare API 类型定义

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cloudflare API 通用响应
#[derive(Debug, Deserialize)]
pub struct CloudflareResponse<T> {
    pub success: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub errors: Vec<CloudflareError>,
    pub result_info: Option<CloudflareResultInfo>,
}

/// 仅解析错误列表（用于非 2xx 响应，`result` 的形状未知）
#[derive(Debug, Deserialize)]
pub struct CloudflareErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<CloudflareError>,
}

#[derive(Debug, Deserialize)]
pub struct CloudflareError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CloudflareResultInfo {
    #[serde(default)]
    pub total_count: u32,
    /// 仅在分页接口中出现
    #[serde(default)]
    pub total_pages: Option<u32>,
}

/// Cloudflare Zone 结构
#[derive(Debug, Deserialize)]
pub struct CloudflareZone {
    pub id: String,
    pub name: String,
    pub status: String,
}

/// Cloudflare DNS Record 结构（响应）
#[derive(Debug, Deserialize)]
pub struct CloudflareDnsRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    #[serde(default)]
    pub content: String,
    pub ttl: u32,
    pub priority: Option<u16>,
    pub proxied: Option<bool>,
    #[serde(default, with = "crate::utils::datetime")]
    pub created_on: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, with = "crate::utils::datetime")]
    pub modified_on: Option<chrono::DateTime<chrono::Utc>>,
    /// SRV/CAA 等复杂记录类型的结构化数据
    pub data: Option<Value>,
}

/// 创建/更新记录的请求体
#[derive(Debug, Serialize)]
pub struct CloudflareRecordBody {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<CloudflareRecordData>,
}

/// 结构化记录数据（请求体）
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CloudflareRecordData {
    Srv(CloudflareSrvData),
    Caa(CloudflareCaaData),
}

/// SRV 记录的 data 字段
#[derive(Debug, Serialize, Deserialize)]
pub struct CloudflareSrvData {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

/// CAA 记录的 data 字段
#[derive(Debug, Serialize, Deserialize)]
pub struct CloudflareCaaData {
    pub flags: u8,
    pub tag: String,
    pub value: String,
}

/// `/user/tokens/verify` 的结果
#[derive(Debug, Deserialize)]
pub struct CloudflareTokenStatus {
    pub status: String,
}

/// DELETE 的结果
#[derive(Debug, Deserialize)]
pub struct CloudflareDeleted {
    #[allow(dead_code)]
    pub id: String,
}
