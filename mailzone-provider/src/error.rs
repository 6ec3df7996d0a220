use serde::{Deserialize, Serialize};

/// Coarse failure class every [`ProviderError`] belongs to.
///
/// Callers branch on the class rather than on individual variants: transient classes
/// are retried inside the API client, the rest cross component boundaries unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorClass {
    /// HTTP 429 after the single scheduled retry.
    RateLimited,
    /// Connection failures, timeouts and 5xx responses after backoff was exhausted.
    TransientNetwork,
    /// Invalid or expired credential, or insufficient permission.
    Auth,
    /// The request was rejected as malformed or conflicting.
    Validation,
    /// The zone or record addressed by the request does not exist.
    NotFound,
    /// Undecodable response or an unmapped provider error.
    Other,
}

/// Unified error type for all authoritative DNS provider operations.
///
/// Each variant includes a `provider` field identifying which provider produced the error,
/// plus variant-specific context. All variants are serializable for structured error reporting.
///
/// # Retryable Errors
///
/// The following variants represent transient failures that may succeed on retry:
/// - [`NetworkError`](Self::NetworkError): connectivity issues and HTTP 5xx
/// - [`Timeout`](Self::Timeout): request timed out
/// - [`RateLimited`](Self::RateLimited): API rate limit exceeded
///
/// The [`ApiClient`](crate::ApiClient) retries these before surfacing them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum ProviderError {
    /// A network-level error occurred (connection refused, reset, HTTP 5xx, etc.).
    NetworkError {
        /// Provider that produced the error.
        provider: String,
        /// Error details.
        detail: String,
    },

    /// The provided credentials are invalid or expired.
    InvalidCredentials {
        /// Provider that produced the error.
        provider: String,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// The authenticated token lacks permission for the requested operation.
    PermissionDenied {
        /// Provider that produced the error.
        provider: String,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// A DNS record with the same name/type/content already exists.
    RecordExists {
        /// Provider that produced the error.
        provider: String,
        /// Name of the conflicting record.
        record_name: String,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// The specified DNS record was not found.
    RecordNotFound {
        /// Provider that produced the error.
        provider: String,
        /// ID of the record that was not found.
        record_id: String,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// A request parameter is invalid (bad TTL, malformed address, bad type/value combination).
    InvalidParameter {
        /// Provider that produced the error.
        provider: String,
        /// Name of the invalid parameter.
        param: String,
        /// Description of what's wrong.
        detail: String,
    },

    /// The requested DNS record type is not supported by this provider.
    UnsupportedRecordType {
        /// Provider that produced the error.
        provider: String,
        /// The unsupported record type string.
        record_type: String,
    },

    /// The account's record quota has been exceeded.
    ///
    /// Unlike [`RateLimited`](Self::RateLimited), this is not a transient condition.
    QuotaExceeded {
        /// Provider that produced the error.
        provider: String,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// The API rate limit has been exceeded (HTTP 429).
    RateLimited {
        /// Provider that produced the error.
        provider: String,
        /// Wait time in seconds announced by the `Retry-After` header, if any.
        retry_after: Option<u64>,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// The HTTP request timed out.
    Timeout {
        /// Provider that produced the error.
        provider: String,
        /// Error details.
        detail: String,
    },

    /// The specified zone was not found.
    DomainNotFound {
        /// Provider that produced the error.
        provider: String,
        /// Zone name or identifier that was not found.
        domain: String,
        /// Original error message from the provider API, if available.
        raw_message: Option<String>,
    },

    /// Failed to parse the provider's API response.
    ParseError {
        /// Provider that produced the error.
        provider: String,
        /// Details about the parse failure.
        detail: String,
    },

    /// Failed to serialize a request body.
    SerializationError {
        /// Provider that produced the error.
        provider: String,
        /// Details about the serialization failure.
        detail: String,
    },

    /// An unrecognized error from the provider API.
    Unknown {
        /// Provider that produced the error.
        provider: String,
        /// Raw error code from the API, if available.
        raw_code: Option<String>,
        /// Raw error message from the API.
        raw_message: String,
    },
}

impl ProviderError {
    /// 错误所属的分类
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::NetworkError { .. } | Self::Timeout { .. } => ErrorClass::TransientNetwork,
            Self::InvalidCredentials { .. } | Self::PermissionDenied { .. } => ErrorClass::Auth,
            Self::InvalidParameter { .. }
            | Self::UnsupportedRecordType { .. }
            | Self::RecordExists { .. }
            | Self::QuotaExceeded { .. } => ErrorClass::Validation,
            Self::RecordNotFound { .. } | Self::DomainNotFound { .. } => ErrorClass::NotFound,
            Self::ParseError { .. } | Self::SerializationError { .. } | Self::Unknown { .. } => {
                ErrorClass::Other
            }
        }
    }

    /// 是否为可重试的瞬时错误（网络、超时、限流）
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::RateLimited | ErrorClass::TransientNetwork
        )
    }

    /// 是否为预期行为（用户输入、资源不存在等），用于日志分级。
    ///
    /// 返回 `true` 时应使用 `warn` 级别，`false` 时使用 `error` 级别。
    #[must_use]
    pub fn is_expected(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Auth | ErrorClass::Validation | ErrorClass::NotFound
        )
    }

    /// Provider tag carried by every variant.
    pub fn provider(&self) -> &str {
        match self {
            Self::NetworkError { provider, .. }
            | Self::InvalidCredentials { provider, .. }
            | Self::PermissionDenied { provider, .. }
            | Self::RecordExists { provider, .. }
            | Self::RecordNotFound { provider, .. }
            | Self::InvalidParameter { provider, .. }
            | Self::UnsupportedRecordType { provider, .. }
            | Self::QuotaExceeded { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::DomainNotFound { provider, .. }
            | Self::ParseError { provider, .. }
            | Self::SerializationError { provider, .. }
            | Self::Unknown { provider, .. } => provider,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkError { provider, detail } => {
                write!(f, "[{provider}] Network error: {detail}")
            }
            Self::InvalidCredentials {
                provider,
                raw_message,
            } => match raw_message {
                Some(msg) => write!(f, "[{provider}] Invalid credentials: {msg}"),
                None => write!(f, "[{provider}] Invalid credentials"),
            },
            Self::PermissionDenied {
                provider,
                raw_message,
            } => match raw_message {
                Some(msg) => write!(f, "[{provider}] Permission denied: {msg}"),
                None => write!(f, "[{provider}] Permission denied"),
            },
            Self::RecordExists {
                provider,
                record_name,
                ..
            } => write!(f, "[{provider}] Record '{record_name}' already exists"),
            Self::RecordNotFound {
                provider,
                record_id,
                ..
            } => write!(f, "[{provider}] Record '{record_id}' not found"),
            Self::InvalidParameter {
                provider,
                param,
                detail,
            } => write!(f, "[{provider}] Invalid parameter '{param}': {detail}"),
            Self::UnsupportedRecordType {
                provider,
                record_type,
            } => write!(f, "[{provider}] Unsupported record type: {record_type}"),
            Self::QuotaExceeded { provider, .. } => write!(f, "[{provider}] Quota exceeded"),
            Self::RateLimited {
                provider,
                retry_after,
                ..
            } => match retry_after {
                Some(secs) => write!(f, "[{provider}] Rate limited (retry after {secs}s)"),
                None => write!(f, "[{provider}] Rate limited"),
            },
            Self::Timeout { provider, detail } => {
                write!(f, "[{provider}] Request timeout: {detail}")
            }
            Self::DomainNotFound {
                provider,
                domain,
                raw_message,
            } => match raw_message {
                Some(msg) => write!(f, "[{provider}] Zone '{domain}' not found: {msg}"),
                None => write!(f, "[{provider}] Zone '{domain}' not found"),
            },
            Self::ParseError { provider, detail } => {
                write!(f, "[{provider}] Parse error: {detail}")
            }
            Self::SerializationError { provider, detail } => {
                write!(f, "[{provider}] Serialization error: {detail}")
            }
            Self::Unknown {
                provider,
                raw_code,
                raw_message,
            } => match raw_code {
                Some(code) => write!(f, "[{provider}] {raw_message} (code {code})"),
                None => write!(f, "[{provider}] {raw_message}"),
            },
        }
    }
}

impl std::error::Error for ProviderError {}

/// Convenience type alias for `Result<T, ProviderError>`.
pub type Result<T> = std::result::Result<T, ProviderError>;
