//! Cloudflare error mapping

use crate::error::ProviderError;
use crate::http_client::{ErrorContext, ErrorDecoder};
use crate::traits::{ProviderErrorMapper, RawApiError};

use super::types::CloudflareErrorEnvelope;

/// Maps Cloudflare error codes, then HTTP status, onto [`ProviderError`].
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CloudflareErrorMapper;

impl CloudflareErrorMapper {
    /// 无法通过错误码识别时，按 HTTP 状态码兜底
    fn from_status(&self, status: u16, message: String, context: &ErrorContext) -> Option<ProviderError> {
        let provider = self.provider_name().to_string();
        match status {
            401 => Some(ProviderError::InvalidCredentials {
                provider,
                raw_message: Some(message),
            }),
            403 => Some(ProviderError::PermissionDenied {
                provider,
                raw_message: Some(message),
            }),
            400 | 422 => Some(ProviderError::InvalidParameter {
                provider,
                param: "general".to_string(),
                detail: message,
            }),
            404 => Some(match &context.record_id {
                Some(record_id) => ProviderError::RecordNotFound {
                    provider,
                    record_id: record_id.clone(),
                    raw_message: Some(message),
                },
                None => ProviderError::DomainNotFound {
                    provider,
                    domain: context
                        .domain
                        .clone()
                        .unwrap_or_else(|| "<unknown>".to_string()),
                    raw_message: Some(message),
                },
            }),
            _ => None,
        }
    }
}

/// Cloudflare error code mapping
/// Reference: <https://api.cloudflare.com/#getting-started-responses>
impl ProviderErrorMapper for CloudflareErrorMapper {
    fn provider_name(&self) -> &'static str {
        "cloudflare"
    }

    fn map_error(&self, raw: RawApiError, context: &ErrorContext) -> ProviderError {
        match raw.code.as_deref() {
            // Authentication error
            // 6003: Invalid request headers
            // 6103: Invalid format for X-Auth-Key header
            // 6111: Invalid format for Authorization header
            // 9109: Unauthorized to access requested resource / Max auth failures reached
            // 10000: Authentication error
            Some("6003" | "6103" | "6111" | "9109" | "10000") => {
                ProviderError::InvalidCredentials {
                    provider: self.provider_name().to_string(),
                    raw_message: Some(raw.message),
                }
            }

            // Invalid parameter
            // 1004: DNS Validation Error
            // 9000: Invalid or missing name
            // 9005: Content for A record is invalid
            // 9006: Content for AAAA record is invalid
            // 9009: Content for MX record must be a hostname
            // 9021: Invalid TTL
            // 9041: This DNS record cannot be proxied
            Some(code @ ("1004" | "9000" | "9005" | "9006" | "9009" | "9021" | "9041")) => {
                let param = match code {
                    "9000" => "name",
                    "9005" | "9006" | "9009" => "value",
                    "9021" => "ttl",
                    "9041" => "proxied",
                    _ => "general",
                };
                ProviderError::InvalidParameter {
                    provider: self.provider_name().to_string(),
                    param: param.to_string(),
                    detail: raw.message,
                }
            }

            // Record already exists (81053..=81058)
            Some("81053" | "81054" | "81055" | "81056" | "81057" | "81058") => {
                ProviderError::RecordExists {
                    provider: self.provider_name().to_string(),
                    record_name: context
                        .record_name
                        .clone()
                        .unwrap_or_else(|| "<unknown>".to_string()),
                    raw_message: Some(raw.message),
                }
            }

            // 81044: Record does not exist
            Some("81044") => ProviderError::RecordNotFound {
                provider: self.provider_name().to_string(),
                record_id: context
                    .record_id
                    .clone()
                    .unwrap_or_else(|| "<unknown>".to_string()),
                raw_message: Some(raw.message),
            },

            // 81045: The record quota has been exceeded
            Some("81045") => ProviderError::QuotaExceeded {
                provider: self.provider_name().to_string(),
                raw_message: Some(raw.message),
            },

            // Zone does not exist
            // 7000: No route for that URI
            // 7003: Could not route to /path, perhaps your object identifier is invalid?
            Some("7000" | "7003") => ProviderError::DomainNotFound {
                provider: self.provider_name().to_string(),
                domain: context
                    .domain
                    .clone()
                    .unwrap_or_else(|| "<unknown>".to_string()),
                raw_message: Some(raw.message),
            },

            _ => self.unknown_error(raw),
        }
    }
}

impl ErrorDecoder for CloudflareErrorMapper {
    fn decode(&self, status: u16, body: &str, context: &ErrorContext) -> ProviderError {
        let first = serde_json::from_str::<CloudflareErrorEnvelope>(body)
            .ok()
            .and_then(|envelope| envelope.errors.into_iter().next());

        let (raw, message) = match first {
            Some(e) => (
                RawApiError::with_code(e.code.to_string(), e.message.clone()),
                e.message,
            ),
            None => {
                let message = format!("HTTP {status}");
                (RawApiError::new(message.clone()), message)
            }
        };

        match self.map_error(raw, context) {
            ProviderError::Unknown {
                raw_code,
                raw_message,
                ..
            } => self
                .from_status(status, message, context)
                .unwrap_or_else(|| ProviderError::Unknown {
                    provider: self.provider_name().to_string(),
                    raw_code: raw_code.or_else(|| Some(status.to_string())),
                    raw_message,
                }),
            mapped => mapped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    fn ctx() -> ErrorContext {
        ErrorContext::default()
    }

    fn ctx_with_record() -> ErrorContext {
        ErrorContext {
            record_name: Some("mail.example.com".to_string()),
            record_id: Some("rec-123".to_string()),
            domain: Some("example.com".to_string()),
        }
    }

    fn map(code: &str) -> ProviderError {
        CloudflareErrorMapper.map_error(RawApiError::with_code(code, "msg"), &ctx_with_record())
    }

    fn envelope(code: i64, message: &str) -> String {
        serde_json::json!({
            "success": false,
            "errors": [{ "code": code, "message": message }],
            "messages": [],
            "result": null
        })
        .to_string()
    }

    #[test]
    fn code_table() {
        let table: &[(&[&str], ErrorClass)] = &[
            (&["6003", "6103", "6111", "9109", "10000"], ErrorClass::Auth),
            (
                &["1004", "9000", "9005", "9006", "9009", "9021", "9041"],
                ErrorClass::Validation,
            ),
            (
                &["81053", "81054", "81055", "81056", "81057", "81058"],
                ErrorClass::Validation,
            ),
            (&["81045"], ErrorClass::Validation),
            (&["81044", "7000", "7003"], ErrorClass::NotFound),
            (&["99999"], ErrorClass::Other),
        ];
        for (codes, class) in table {
            for code in *codes {
                assert_eq!(map(code).class(), *class, "code {code}");
            }
        }
    }

    #[test]
    fn invalid_parameter_names() {
        for (code, param) in [
            ("9000", "name"),
            ("9005", "value"),
            ("9009", "value"),
            ("9021", "ttl"),
            ("9041", "proxied"),
            ("1004", "general"),
        ] {
            assert!(
                matches!(map(code), ProviderError::InvalidParameter { param: p, .. } if p == param),
                "code {code}"
            );
        }
    }

    #[test]
    fn context_fills_record_fields() {
        assert!(matches!(
            map("81057"),
            ProviderError::RecordExists { record_name, .. } if record_name == "mail.example.com"
        ));
        assert!(matches!(
            map("81044"),
            ProviderError::RecordNotFound { record_id, .. } if record_id == "rec-123"
        ));
        assert!(matches!(
            map("81045"),
            ProviderError::QuotaExceeded { .. }
        ));
    }

    #[test]
    fn decode_prefers_error_code() {
        let err = CloudflareErrorMapper.decode(403, &envelope(10000, "Authentication error"), &ctx());
        assert!(matches!(err, ProviderError::InvalidCredentials { .. }));
    }

    #[test]
    fn decode_falls_back_to_status() {
        let err = CloudflareErrorMapper.decode(403, &envelope(12345, "nope"), &ctx());
        assert!(matches!(err, ProviderError::PermissionDenied { .. }));

        let err = CloudflareErrorMapper.decode(401, "not json", &ctx());
        assert!(matches!(err, ProviderError::InvalidCredentials { .. }));

        let err = CloudflareErrorMapper.decode(404, "", &ctx_with_record());
        assert!(matches!(err, ProviderError::RecordNotFound { .. }));

        let err = CloudflareErrorMapper.decode(
            404,
            "",
            &ErrorContext {
                domain: Some("zone-1".to_string()),
                ..ErrorContext::default()
            },
        );
        assert!(
            matches!(err, ProviderError::DomainNotFound { domain, .. } if domain == "zone-1")
        );
    }

    #[test]
    fn decode_unknown_keeps_code() {
        let err = CloudflareErrorMapper.decode(409, &envelope(42, "conflict"), &ctx());
        assert!(matches!(
            err,
            ProviderError::Unknown { raw_code: Some(code), raw_message, .. }
                if code == "42" && raw_message == "conflict"
        ));
        let err = CloudflareErrorMapper.decode(418, "", &ctx());
        assert!(matches!(
            err,
            ProviderError::Unknown { raw_code: Some(code), .. } if code == "418"
        ));
    }
}
