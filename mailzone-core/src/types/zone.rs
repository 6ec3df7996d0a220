//! Zone 类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A domain resolved to the provider zone that holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    /// Zone apex, lower-case, no trailing dot.
    pub domain: String,
    /// Provider zone id
    pub provider_zone_id: String,
    /// When the zone map holding this entry was fetched.
    pub fetched_at: DateTime<Utc>,
}
