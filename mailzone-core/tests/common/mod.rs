//! 共享测试工具：模拟 Cloudflare API 与脚本化解析器

#![allow(dead_code, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use mailzone_core::{DnsEngine, DnsProvider, EngineConfig, ResultCache};
use mailzone_provider::{ClientSettings, CloudflareProvider, RetryPolicy};
use mailzone_verifier::testing::ScriptedResolver;
use mailzone_verifier::{PropagationVerifier, RecordResolver, VerifierOptions};
use serde_json::{Value, json};

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
}

pub const TEST_TOKEN: &str = "test-token-0123456789";

/// Cloudflare provider pointed at the mock server, without retry delays.
pub fn mock_provider(base_url: &str) -> Arc<dyn DnsProvider> {
    let settings = ClientSettings {
        base_url: Some(base_url.to_string()),
        capacity: 10,
        refill_per_sec: 100.0,
        retry: RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            jitter: 0.0,
        },
        observer: None,
    };
    let provider = CloudflareProvider::with_settings(TEST_TOKEN, &settings)
        .unwrap_or_else(|e| panic!("failed to build provider: {e}"));
    Arc::new(provider)
}

/// Five resolvers that all answer `values`.
pub fn agreeing_verifier(values: &[&str]) -> PropagationVerifier {
    let resolvers: Vec<Arc<dyn RecordResolver>> = (1..=5)
        .map(|n| Arc::new(ScriptedResolver::answering(n, values)) as Arc<dyn RecordResolver>)
        .collect();
    PropagationVerifier::new(resolvers, VerifierOptions::default())
        .unwrap_or_else(|e| panic!("failed to build verifier: {e}"))
}

/// Engine over the mock server and scripted resolvers.
pub fn engine(base_url: &str, answers: &[&str]) -> DnsEngine {
    let config = EngineConfig::default();
    let cache = Arc::new(ResultCache::new(config.cache_options()));
    DnsEngine::new(mock_provider(base_url), agreeing_verifier(answers), cache, &config)
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

pub fn cf_zone(id: &str, name: &str) -> Value {
    json!({ "id": id, "name": name, "status": "active" })
}

pub fn cf_record(id: &str, record_type: &str, name: &str, content: &str) -> Value {
    json!({
        "id": id,
        "type": record_type,
        "name": name,
        "content": content,
        "ttl": 300,
        "proxied": false,
        "created_on": "2024-01-15T10:30:00.000000Z",
        "modified_on": "2024-01-15T10:30:00.000000Z"
    })
}

pub fn cf_mx_record(id: &str, name: &str, priority: u16, exchange: &str) -> Value {
    let mut record = cf_record(id, "MX", name, exchange);
    record["priority"] = json!(priority);
    record
}
