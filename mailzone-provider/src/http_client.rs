//! Rate-limited HTTP client shared by provider implementations
//!
//! Every request goes through the same pipeline: take a token from the bucket,
//! send, classify the response, and retry transient failures.
//!
//! # Retry strategy
//! - **HTTP 429**: sleep for `Retry-After` (5s when absent), then retry exactly once
//!   without taking another token. A second 429 surfaces as `RateLimited`.
//! - **HTTP 5xx / transport errors**: exponential backoff with jitter, up to
//!   `max_retries` times.
//! - **Other 4xx**: never retried; the body is handed to the provider's [`ErrorDecoder`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

use crate::error::{ErrorClass, ProviderError, Result};
use crate::providers::common::create_http_client;
use crate::rate_limiter::TokenBucket;
use crate::utils::log_sanitizer::truncate_for_log;

/// Wait applied to a 429 response that carries no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

// ============ Retry policy ============

/// Backoff parameters for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (0 disables retry).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay, before jitter.
    pub max_delay: Duration,
    /// Relative jitter applied to every delay, e.g. `0.2` for ±20%.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay: `base * 2^attempt`, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let capped_attempt = attempt.min(20); // Prevent 2^attempt from overflowing
        self.base_delay
            .saturating_mul(1_u32 << capped_attempt)
            .min(self.max_delay)
    }

    /// Backoff delay with ±`jitter` applied.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter <= 0.0 {
            return delay;
        }
        let factor = 1.0 + rand::rng().random_range(-jitter..=jitter);
        delay.mul_f64(factor)
    }
}

// ============ Request / response ============

/// Extra information used when mapping a provider error back to the request.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Record name (for `RecordExists` and similar errors).
    pub record_name: Option<String>,
    /// Record ID (for `RecordNotFound` and similar errors).
    pub record_id: Option<String>,
    /// Zone name or ID (for `DomainNotFound` and similar errors).
    pub domain: Option<String>,
}

/// A single logical API call. Retries reuse the same request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the client's base URL, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub context: ErrorContext,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            context: ErrorContext::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::PATCH, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    pub metrics: CallRecord,
    provider: &'static str,
}

impl ApiResponse {
    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        HttpUtils::parse_json(&self.body, self.provider)
    }
}

// ============ Metrics ============

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum CallOutcome {
    Success,
    Failed { class: ErrorClass },
}

/// Per-call metrics. Produced for every call, successful or not.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub method: String,
    pub path: String,
    /// Wall time from the first token request to the final response.
    pub latency_ms: u64,
    /// Attempts beyond the first.
    pub retries: u32,
    /// Number of 429 responses that were waited out.
    pub rate_limit_waits: u32,
    /// Time spent waiting for tokens from the bucket.
    pub limiter_wait_ms: u64,
    /// HTTP status of the last attempt, if any response was received.
    pub final_status: Option<u16>,
    pub outcome: CallOutcome,
}

/// Receives a [`CallRecord`] for every completed call.
pub trait CallObserver: Send + Sync {
    fn record(&self, call: &CallRecord);
}

/// Observer that keeps every record in memory.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<CallRecord>>,
}

impl CallLog {
    pub fn snapshot(&self) -> Vec<CallRecord> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CallObserver for CallLog {
    fn record(&self, call: &CallRecord) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.clone());
    }
}

/// Maps a non-retryable error response to the unified error type.
pub trait ErrorDecoder: Send + Sync {
    fn decode(&self, status: u16, body: &str, context: &ErrorContext) -> ProviderError;
}

// ============ Low-level helpers ============

/// A response as read off the wire, before classification.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub status: u16,
    pub retry_after: Option<u64>,
    pub body: String,
}

/// HTTP tool function set
pub struct HttpUtils;

impl HttpUtils {
    /// Sends a request and reads the whole response.
    ///
    /// Transport failures map to `Timeout` or `NetworkError`; every HTTP status,
    /// including 429 and 5xx, is returned as a [`RawResponse`] for the caller to classify.
    pub(crate) async fn send(
        request_builder: RequestBuilder,
        provider_name: &str,
        method_name: &str,
        path: &str,
    ) -> Result<RawResponse> {
        log::debug!("[{provider_name}] {method_name} {path}");

        let response = request_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: provider_name.to_string(),
                    detail: e.to_string(),
                }
            } else {
                ProviderError::NetworkError {
                    provider: provider_name.to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        log::debug!("[{provider_name}] Response Status: {status}");

        // Extract Retry-After header (before consuming response body)
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::NetworkError {
                provider: provider_name.to_string(),
                detail: format!("Failed to read response body: {e}"),
            })?;

        log::debug!(
            "[{provider_name}] Response Body: {}",
            truncate_for_log(&body)
        );

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }

    /// Parse JSON response
    pub fn parse_json<T>(response_text: &str, provider_name: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_str(response_text).map_err(|e| {
            log::error!("[{provider_name}] JSON parse failed: {e}");
            log::error!(
                "[{provider_name}] Raw response: {}",
                truncate_for_log(response_text)
            );
            ProviderError::ParseError {
                provider: provider_name.to_string(),
                detail: e.to_string(),
            }
        })
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ============ Settings ============

/// Construction parameters for a provider's [`ApiClient`].
#[derive(Clone)]
pub struct ClientSettings {
    /// Override for the provider's API base URL.
    pub base_url: Option<String>,
    /// Token bucket burst capacity.
    pub capacity: u32,
    /// Token bucket refill rate in requests per second.
    pub refill_per_sec: f64,
    pub retry: RetryPolicy,
    pub observer: Option<Arc<dyn CallObserver>>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            capacity: crate::rate_limiter::DEFAULT_CAPACITY,
            refill_per_sec: crate::rate_limiter::DEFAULT_REFILL_PER_SEC,
            retry: RetryPolicy::default(),
            observer: None,
        }
    }
}

impl std::fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSettings")
            .field("base_url", &self.base_url)
            .field("capacity", &self.capacity)
            .field("refill_per_sec", &self.refill_per_sec)
            .field("retry", &self.retry)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

// ============ ApiClient ============

/// Authenticated, rate-limited, retrying client for one provider account.
pub struct ApiClient {
    provider: &'static str,
    http: Client,
    base_url: String,
    token: String,
    limiter: Arc<TokenBucket>,
    retry: RetryPolicy,
    decoder: Arc<dyn ErrorDecoder>,
    observer: Option<Arc<dyn CallObserver>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        provider: &'static str,
        base_url: impl Into<String>,
        token: impl Into<String>,
        limiter: Arc<TokenBucket>,
        retry: RetryPolicy,
        decoder: Arc<dyn ErrorDecoder>,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            http: create_http_client(provider)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            limiter,
            retry,
            decoder,
            observer: None,
        })
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CallObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn limiter(&self) -> &Arc<TokenBucket> {
        &self.limiter
    }

    fn build(&self, request: &ApiRequest) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .bearer_auth(&self.token);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        builder
    }

    /// Executes one logical call, applying the rate limit and the retry strategy.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let started = Instant::now();
        let method = request.method.as_str();
        let mut retries = 0_u32;
        let mut transient_attempt = 0_u32;
        let mut rate_limit_waits = 0_u32;
        let mut limiter_wait = Duration::ZERO;
        let mut skip_limiter = false;
        let mut final_status = None;

        let result = loop {
            if skip_limiter {
                skip_limiter = false;
            } else {
                limiter_wait += self.limiter.acquire(1).await;
            }

            let sent =
                HttpUtils::send(self.build(request), self.provider, method, &request.path).await;

            let error = match sent {
                Ok(raw) => {
                    final_status = Some(raw.status);
                    match raw.status {
                        200..=299 => break Ok(raw),
                        429 => {
                            let err = ProviderError::RateLimited {
                                provider: self.provider.to_string(),
                                retry_after: raw.retry_after,
                                raw_message: Some(truncate_for_log(&raw.body)),
                            };
                            if rate_limit_waits > 0 {
                                break Err(err);
                            }
                            let wait = Duration::from_secs(
                                raw.retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
                            );
                            log::warn!(
                                "[{}] Rate limited on {method} {}, retrying once in {}s",
                                self.provider,
                                request.path,
                                wait.as_secs()
                            );
                            rate_limit_waits += 1;
                            retries += 1;
                            tokio::time::sleep(wait).await;
                            skip_limiter = true;
                            continue;
                        }
                        500..=599 => ProviderError::NetworkError {
                            provider: self.provider.to_string(),
                            detail: format!("HTTP {}: {}", raw.status, truncate_for_log(&raw.body)),
                        },
                        status => {
                            break Err(self.decoder.decode(status, &raw.body, &request.context));
                        }
                    }
                }
                Err(e) => e,
            };

            if transient_attempt >= self.retry.max_retries {
                break Err(error);
            }
            let delay = self.retry.jittered_delay(transient_attempt);
            transient_attempt += 1;
            retries += 1;
            log::warn!(
                "[{}] Request failed (attempt {}/{}), retrying in {:.1}s: {}",
                self.provider,
                transient_attempt,
                self.retry.max_retries,
                delay.as_secs_f32(),
                error
            );
            tokio::time::sleep(delay).await;
        };

        let metrics = CallRecord {
            method: method.to_string(),
            path: request.path.clone(),
            latency_ms: duration_ms(started.elapsed()),
            retries,
            rate_limit_waits,
            limiter_wait_ms: duration_ms(limiter_wait),
            final_status,
            outcome: match &result {
                Ok(_) => CallOutcome::Success,
                Err(e) => CallOutcome::Failed { class: e.class() },
            },
        };
        if let Some(observer) = &self.observer {
            observer.record(&metrics);
        }

        match result {
            Ok(raw) => Ok(ApiResponse {
                status: raw.status,
                body: raw.body,
                metrics,
                provider: self.provider,
            }),
            Err(e) => {
                if e.is_expected() {
                    log::warn!("[{}] {method} {} failed: {e}", self.provider, request.path);
                } else {
                    log::error!("[{}] {method} {} failed: {e}", self.provider, request.path);
                }
                Err(e)
            }
        }
    }
}
