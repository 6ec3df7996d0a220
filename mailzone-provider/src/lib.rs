//! # mailzone-provider
//!
//! Rate-limited client for an authoritative DNS provider's HTTP API, with a typed
//! record model and a normalized error taxonomy.
//!
//! ## Supported Providers
//!
//! | Provider | Feature Flag | Auth Method |
//! |----------|-------------|-------------|
//! | [Cloudflare](https://www.cloudflare.com/) | `cloudflare` | Bearer Token |
//!
//! ## Feature Flags
//!
//! - **`cloudflare`** *(default)*: Enable the Cloudflare v4 provider.
//! - **`native-tls`** *(default)*: Use the platform's native TLS implementation.
//! - **`rustls`**: Use rustls. Recommended for cross-compilation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mailzone_provider::{
//!     create_provider, ClientSettings, DnsProvider, ProviderCredentials, RecordQueryParams,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = ProviderCredentials::Cloudflare {
//!         api_token: "your-token".to_string(),
//!     };
//!     let provider = create_provider(credentials, &ClientSettings::default())?;
//!
//!     provider.validate_credentials().await?;
//!
//!     let zones = provider.list_all_zones().await?;
//!     for zone in &zones {
//!         println!("{} ({:?})", zone.name, zone.status);
//!     }
//!
//!     let records = provider
//!         .list_all_records(&zones[0].id, &RecordQueryParams::default())
//!         .await?;
//!     for record in &records {
//!         println!("{}", record.key());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Rate limiting and retries
//!
//! Every call passes through a shared [`TokenBucket`] (burst 10, 4 req/s by default).
//! HTTP 429 waits out `Retry-After` and retries once; 5xx and transport failures are
//! retried with jittered exponential backoff. Each call yields a [`CallRecord`].
//!
//! ## Error Handling
//!
//! All provider operations return [`Result<T, ProviderError>`](ProviderError).
//! [`ProviderError::class`] groups variants into an [`ErrorClass`]; only the
//! `RateLimited` and `TransientNetwork` classes are retryable.

mod error;
mod factory;
mod http_client;
mod providers;
mod rate_limiter;
mod traits;
mod types;
mod utils;

// Re-export error types
pub use error::{ErrorClass, ProviderError, Result};

// Re-export factory functions
pub use factory::create_provider;

// Re-export core trait only (internal traits are not exported)
pub use traits::{DnsProvider, RECORD_PAGE_SIZE, ZONE_PAGE_SIZE};

// Re-export HTTP client building blocks
pub use http_client::{
    ApiClient, ApiRequest, ApiResponse, CallLog, CallObserver, CallOutcome, CallRecord,
    ClientSettings, DEFAULT_RETRY_AFTER_SECS, ErrorContext, ErrorDecoder, RetryPolicy,
};
pub use rate_limiter::{DEFAULT_CAPACITY, DEFAULT_REFILL_PER_SEC, TokenBucket};

// Re-export types
pub use types::{
    CredentialValidationError, DnsRecord, DnsRecordType, MAX_TTL, MAX_TXT_LEN, MIN_TTL,
    PaginatedResponse, PaginationParams, ProviderCredentials, ProviderZone, RecordData, RecordKey,
    RecordQueryParams, RecordValidationError, TTL_AUTOMATIC, ZoneStatus, canonical_hostname,
    canonical_ip, canonical_txt,
};

// Re-export helpers
pub use providers::common::relative_to_full_name;
pub use utils::datetime;
pub use utils::log_sanitizer::{mask_secret, truncate_for_log};

// Re-export concrete providers (behind feature flags)
#[cfg(feature = "cloudflare")]
pub use providers::{CF_API_BASE, CloudflareProvider};
