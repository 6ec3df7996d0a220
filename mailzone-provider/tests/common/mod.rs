//! 共享测试工具和辅助函数

#![allow(dead_code, clippy::panic)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use mailzone_provider::{
    CallLog, ClientSettings, CloudflareProvider, DnsProvider, ProviderCredentials, RetryPolicy,
    create_provider,
};
use serde_json::{Value, json};

/// 跳过测试的宏（当环境变量缺失时）
#[macro_export]
macro_rules! skip_if_no_credentials {
    ($($var:expr),+) => {
        $(
            if std::env::var($var).is_err() {
                eprintln!("跳过测试: 缺少环境变量 {}", $var);
                return;
            }
        )+
    };
}

/// 断言 `Result` 为 `Ok`，并解包返回内部值（失败则直接让测试失败）。
#[macro_export]
macro_rules! require_ok {
    ($expr:expr $(,)?) => {{
        let res = $expr;
        assert!(res.is_ok(), "expected Ok(..), got {res:?}");
        let Ok(val) = res else {
            return;
        };
        val
    }};
    ($expr:expr, $($msg:tt)+) => {{
        let res = $expr;
        assert!(
            res.is_ok(),
            "{}: {res:?}",
            format_args!($($msg)+)
        );
        let Ok(val) = res else {
            return;
        };
        val
    }};
}

/// 断言 `Option` 为 `Some`，并解包返回内部值（失败则直接让测试失败）。
#[macro_export]
macro_rules! require_some {
    ($expr:expr $(,)?) => {{
        let opt = $expr;
        assert!(opt.is_some(), "expected Some(..), got None");
        let Some(val) = opt else {
            return;
        };
        val
    }};
    ($expr:expr, $($msg:tt)+) => {{
        let opt = $expr;
        assert!(opt.is_some(), "{}", format_args!($($msg)+));
        let Some(val) = opt else {
            return;
        };
        val
    }};
}

pub const TEST_TOKEN: &str = "test-token-0123456789";

/// 快速重试策略（无抖动），避免测试等待过久
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        jitter: 0.0,
    }
}

/// 指向 mock 服务器的 Cloudflare provider，附带调用日志
pub fn mock_provider(base_url: &str) -> (CloudflareProvider, Arc<CallLog>) {
    let log = Arc::new(CallLog::default());
    let settings = ClientSettings {
        base_url: Some(base_url.to_string()),
        capacity: 10,
        refill_per_sec: 100.0,
        retry: fast_retry(),
        observer: Some(log.clone()),
    };
    let provider = CloudflareProvider::with_settings(TEST_TOKEN, &settings)
        .unwrap_or_else(|e| panic!("failed to build provider: {e}"));
    (provider, log)
}

/// 成功信封
pub fn cf_ok(result: Value) -> Value {
    json!({ "success": true, "errors": [], "messages": [], "result": result })
}

/// 带分页信息的成功信封
pub fn cf_page(result: Value, page: u32, per_page: u32, total_pages: u32) -> Value {
    let count = result.as_array().map_or(0, Vec::len);
    json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result,
        "result_info": {
            "page": page,
            "per_page": per_page,
            "count": count,
            "total_count": count,
            "total_pages": total_pages
        }
    })
}

/// 失败信封
pub fn cf_err(code: i64, message: &str) -> Value {
    json!({
        "success": false,
        "errors": [{ "code": code, "message": message }],
        "messages": [],
        "result": null
    })
}

pub fn cf_zone(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name, "status": "active" })
}

pub fn cf_a_record(id: &str, name: &str, address: &str) -> Value {
    json!({
        "id": id,
        "type": "A",
        "name": name,
        "content": address,
        "ttl": 300,
        "proxied": false,
        "created_on": "2024-01-15T10:30:00.000000Z",
        "modified_on": "2024-01-15T10:30:00.000000Z"
    })
}

/// 生成唯一的测试记录名称
pub fn generate_test_record_name() -> String {
    format!("_test-{}", chrono::Utc::now().timestamp_millis())
}

/// 测试上下文 - 封装 Provider 和测试域名（真实 API）
pub struct TestContext {
    pub provider: Arc<dyn DnsProvider>,
    pub domain: String,
}

impl TestContext {
    /// 创建 Cloudflare 测试上下文
    pub fn cloudflare() -> Option<Self> {
        let api_token = env::var("CLOUDFLARE_API_TOKEN").ok()?;
        let domain = env::var("TEST_DOMAIN").ok()?;

        let credentials = ProviderCredentials::Cloudflare { api_token };
        let provider = create_provider(credentials, &ClientSettings::default()).ok()?;

        Some(Self { provider, domain })
    }

    /// 查找测试域名的 zone id
    pub async fn find_zone_id(&self) -> Option<String> {
        let zones = self.provider.list_all_zones().await.ok()?;
        zones
            .into_iter()
            .find(|z| z.name == self.domain)
            .map(|z| z.id)
    }
}
