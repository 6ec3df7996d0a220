//! Cloudflare Provider 测试
//!
//! 默认测试使用 wiremock 模拟 API；带 `#[ignore]` 的测试访问真实 API:
//! ```bash
//! CLOUDFLARE_API_TOKEN=xxx TEST_DOMAIN=example.com \
//!     cargo test -p mailzone-provider --test cloudflare_test -- --ignored --nocapture --test-threads=1
//! ```

#![allow(clippy::unwrap_used)]

mod common;

use std::time::{Duration, Instant};

use common::{
    TEST_TOKEN, TestContext, cf_a_record, cf_err, cf_ok, cf_page, cf_zone,
    generate_test_record_name, mock_provider,
};
use mailzone_provider::{
    CallOutcome, DnsProvider, DnsRecord, DnsRecordType, ErrorClass, PaginationParams,
    ProviderError, RecordData, RecordQueryParams,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============ Zones ============

#[tokio::test]
async fn lists_all_zones_across_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "50"))
        .and(header("Authorization", format!("Bearer {TEST_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_page(
            json!([cf_zone("z1", "example.com"), cf_zone("z2", "Example.ORG")]),
            1,
            50,
            2,
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_page(
            json!([cf_zone("z3", "mail.example.net")]),
            2,
            50,
            2,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (provider, _) = mock_provider(&server.uri());
    let zones = provider.list_all_zones().await.unwrap();
    let names: Vec<_> = zones.iter().map(|z| z.name.as_str()).collect();
    assert_eq!(names, ["example.com", "example.org", "mail.example.net"]);
}

#[tokio::test]
async fn page_size_is_clamped_for_zones() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("per_page", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_page(json!([]), 1, 50, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let (provider, _) = mock_provider(&server.uri());
    let page = provider
        .list_zones(&PaginationParams {
            page: 1,
            page_size: 500,
        })
        .await
        .unwrap();
    assert!(page.items.is_empty());
    assert!(!page.has_more);
}

// ============ Records ============

#[tokio::test]
async fn lists_records_until_total_pages() {
    let server = MockServer::start().await;
    for page in 1..=3_u32 {
        let records: Vec<_> = (0..2)
            .map(|i| {
                cf_a_record(
                    &format!("r{page}{i}"),
                    "mail.example.com",
                    &format!("203.0.113.{}", page * 10 + i),
                )
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/zones/z1/dns_records"))
            .and(query_param("page", page.to_string().as_str()))
            .and(query_param("per_page", "100"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(cf_page(json!(records), page, 100, 3)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let (provider, log) = mock_provider(&server.uri());
    let records = provider
        .list_all_records("z1", &RecordQueryParams::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 6);
    assert!(records.iter().all(|r| r.id.is_some()));
    assert_eq!(log.snapshot().len(), 3);
}

#[tokio::test]
async fn record_filters_are_sent_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones/z1/dns_records"))
        .and(query_param("name", "mail.example.com"))
        .and(query_param("type", "A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_page(
            json!([cf_a_record("r1", "mail.example.com", "203.0.113.9")]),
            1,
            100,
            1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (provider, _) = mock_provider(&server.uri());
    let filter = RecordQueryParams {
        name: Some("Mail.Example.com.".to_string()),
        record_type: Some(DnsRecordType::A),
        ..RecordQueryParams::default()
    };
    let records = provider.list_all_records("z1", &filter).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].data.content(), "203.0.113.9");
}

#[tokio::test]
async fn create_update_delete_round() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/zones/z1/dns_records"))
        .and(body_partial_json(json!({
            "type": "MX", "name": "example.com", "content": "mx.example.com", "priority": 10, "ttl": 300
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_ok(json!({
            "id": "new-1", "type": "MX", "name": "example.com", "content": "mx.example.com",
            "priority": 10, "ttl": 300
        }))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/zones/z1/dns_records/r1"))
        .and(body_partial_json(json!({ "type": "A", "content": "203.0.113.10" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_ok(cf_a_record(
            "r1",
            "mail.example.com",
            "203.0.113.10",
        ))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/zones/z1/dns_records/r2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_ok(json!({ "id": "r2" }))))
        .expect(1)
        .mount(&server)
        .await;

    let (provider, _) = mock_provider(&server.uri());

    let mx = DnsRecord::new(
        "example.com",
        300,
        RecordData::MX {
            priority: 10,
            exchange: "mx.example.com".to_string(),
        },
    );
    let created = provider.create_record("z1", &mx).await.unwrap();
    assert_eq!(created.id.as_deref(), Some("new-1"));
    assert_eq!(created.key(), mx.key());

    let a = DnsRecord::new(
        "mail.example.com",
        300,
        RecordData::A {
            address: "203.0.113.10".to_string(),
        },
    );
    let updated = provider.update_record("z1", "r1", &a).await.unwrap();
    assert_eq!(updated.data.content(), "203.0.113.10");

    provider.delete_record("z1", "r2").await.unwrap();
}

// ============ Errors ============

#[tokio::test]
async fn missing_record_maps_to_not_found_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(404).set_body_json(cf_err(81044, "Record does not exist.")))
        .expect(1)
        .mount(&server)
        .await;

    let (provider, log) = mock_provider(&server.uri());
    let err = provider.delete_record("z1", "gone").await.unwrap_err();
    assert!(
        matches!(&err, ProviderError::RecordNotFound { record_id, .. } if record_id == "gone"),
        "{err:?}"
    );
    let calls = log.snapshot();
    assert_eq!(calls[0].retries, 0);
    assert_eq!(
        calls[0].outcome,
        CallOutcome::Failed {
            class: ErrorClass::NotFound
        }
    );
}

#[tokio::test]
async fn duplicate_create_maps_to_record_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(cf_err(81057, "The record already exists.")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (provider, _) = mock_provider(&server.uri());
    let record = DnsRecord::new(
        "mail.example.com",
        300,
        RecordData::A {
            address: "203.0.113.9".to_string(),
        },
    );
    let err = provider.create_record("z1", &record).await.unwrap_err();
    assert!(matches!(
        &err,
        ProviderError::RecordExists { record_name, .. } if record_name == "mail.example.com"
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn bad_token_validates_as_false() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/tokens/verify"))
        .respond_with(ResponseTemplate::new(401).set_body_json(cf_err(1000, "Invalid API Token")))
        .mount(&server)
        .await;

    let (provider, _) = mock_provider(&server.uri());
    assert!(!provider.validate_credentials().await.unwrap());
}

#[tokio::test]
async fn active_token_validates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user/tokens/verify"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(cf_ok(json!({ "id": "tok", "status": "active" }))),
        )
        .mount(&server)
        .await;

    let (provider, _) = mock_provider(&server.uri());
    assert!(provider.validate_credentials().await.unwrap());
}

#[tokio::test]
async fn success_false_on_2xx_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_err(9109, "Unauthorized")))
        .mount(&server)
        .await;

    let (provider, _) = mock_provider(&server.uri());
    let err = provider.list_all_zones().await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Auth);
}

#[tokio::test]
async fn gateway_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_page(
            json!([cf_zone("z1", "example.com")]),
            1,
            50,
            1,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (provider, log) = mock_provider(&server.uri());
    let zones = provider.list_all_zones().await.unwrap();
    assert_eq!(zones.len(), 1);
    assert_eq!(log.snapshot()[0].retries, 1);
}

#[tokio::test]
async fn missing_retry_after_waits_default_five_seconds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(429).set_body_json(cf_err(971, "Please wait")))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(cf_page(json!([]), 1, 50, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let (provider, log) = mock_provider(&server.uri());
    let start = Instant::now();
    provider.list_all_zones().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(5));

    let calls = log.snapshot();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].rate_limit_waits, 1);
    assert_eq!(calls[0].retries, 1);
    assert_eq!(calls[0].final_status, Some(200));
}

// ============ 真实 API 测试 ============

#[tokio::test]
#[ignore = "requires network access"]
async fn live_validate_credentials() {
    skip_if_no_credentials!("CLOUDFLARE_API_TOKEN", "TEST_DOMAIN");

    let ctx = require_some!(TestContext::cloudflare());
    let valid = require_ok!(ctx.provider.validate_credentials().await);
    assert!(valid, "token should be active");
}

#[tokio::test]
#[ignore = "requires network access"]
async fn live_create_and_delete_txt() {
    skip_if_no_credentials!("CLOUDFLARE_API_TOKEN", "TEST_DOMAIN");

    let ctx = require_some!(TestContext::cloudflare());
    let zone_id = require_some!(ctx.find_zone_id().await, "test domain not found");

    let name = format!("{}.{}", generate_test_record_name(), ctx.domain);
    let record = DnsRecord::new(
        &name,
        300,
        RecordData::TXT {
            text: "integration-test".to_string(),
        },
    );
    let created = require_ok!(ctx.provider.create_record(&zone_id, &record).await);
    let id = require_some!(created.id.clone());
    require_ok!(ctx.provider.delete_record(&zone_id, &id).await);
}
