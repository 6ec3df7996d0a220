use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

// ============ Pagination ============

/// Pagination parameters for list operations.
///
/// Pages are 1-indexed.
///
/// # Default
///
/// The default is `page = 1, page_size = 50`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    /// Page number (1-indexed).
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
        }
    }
}

impl PaginationParams {
    /// Clamp pagination values to valid ranges.
    ///
    /// - `page` is clamped to `>= 1`
    /// - `page_size` is clamped to `1..=max_page_size`
    #[must_use]
    pub fn validated(&self, max_page_size: u32) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, max_page_size),
        }
    }
}

/// Query parameters for DNS record listing, with optional exact-match filters.
///
/// # Default
///
/// The default is `page = 1, page_size = 100`, with no name or type filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQueryParams {
    /// Page number (1-indexed).
    pub page: u32,
    /// Number of items per page.
    pub page_size: u32,
    /// Optional fully-qualified record name filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional record type filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_type: Option<DnsRecordType>,
}

impl Default for RecordQueryParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 100,
            name: None,
            record_type: None,
        }
    }
}

impl RecordQueryParams {
    /// Same filters, different page.
    #[must_use]
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }

    /// Clamp pagination values to valid ranges, preserving filters.
    #[must_use]
    pub fn validated(&self, max_page_size: u32) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, max_page_size),
            name: self.name.clone(),
            record_type: self.record_type,
        }
    }
}

/// A paginated response wrapper.
///
/// # Type Parameters
///
/// * `T`: The item type (e.g., [`ProviderZone`], [`DnsRecord`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    /// Items in the current page.
    pub items: Vec<T>,
    /// Current page number.
    pub page: u32,
    /// Page size used for this request.
    pub page_size: u32,
    /// Total number of items across all pages.
    pub total_count: u32,
    /// Whether there are more pages after this one.
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    /// Create a new paginated response, automatically computing [`has_more`](Self::has_more).
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total_count: u32) -> Self {
        let has_more = page.saturating_mul(page_size) < total_count;
        Self {
            items,
            page,
            page_size,
            total_count,
            has_more,
        }
    }

    /// Create a response from a provider that reports a page count instead of an item count.
    pub fn from_total_pages(items: Vec<T>, page: u32, page_size: u32, total_pages: u32) -> Self {
        let total_count = u32::try_from(items.len())
            .unwrap_or(u32::MAX)
            .max(total_pages.saturating_mul(page_size));
        Self {
            items,
            page,
            page_size,
            total_count,
            has_more: page < total_pages,
        }
    }
}

// ============ Zone Types ============

/// Status of a zone within the provider account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneStatus {
    /// Zone is active and resolving.
    Active,
    /// Zone is waiting for nameserver delegation.
    Pending,
    /// Zone is paused or deactivated.
    Inactive,
    /// Status could not be determined.
    Unknown,
}

/// A zone as listed by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderZone {
    /// Provider-specific zone identifier.
    pub id: String,
    /// Zone apex (e.g., `"example.com"`), lower-case, no trailing dot.
    pub name: String,
    /// Current zone status.
    pub status: ZoneStatus,
}

// ============ DNS Record Types ============

/// DNS record type identifier.
///
/// Serialized as uppercase strings (`"A"`, `"AAAA"`, `"CNAME"`, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    /// IPv4 address record.
    A,
    /// IPv6 address record.
    Aaaa,
    /// Canonical name (alias) record.
    Cname,
    /// Mail exchange record.
    Mx,
    /// Text record.
    Txt,
    /// Name server record.
    Ns,
    /// Service locator record.
    Srv,
    /// Certificate Authority Authorization record.
    Caa,
}

impl DnsRecordType {
    /// Uppercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Mx => "MX",
            Self::Txt => "TXT",
            Self::Ns => "NS",
            Self::Srv => "SRV",
            Self::Caa => "CAA",
        }
    }

    /// Parse a wire name, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "AAAA" => Some(Self::Aaaa),
            "CNAME" => Some(Self::Cname),
            "MX" => Some(Self::Mx),
            "TXT" => Some(Self::Txt),
            "NS" => Some(Self::Ns),
            "SRV" => Some(Self::Srv),
            "CAA" => Some(Self::Caa),
            _ => None,
        }
    }
}

impl std::fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum TXT payload accepted for a single record, in bytes.
pub const MAX_TXT_LEN: usize = 4096;

/// Type-safe representation of DNS record data.
///
/// Each variant carries the fields specific to that record type. MX and SRV carry
/// their priority as a required field, so a prioritised record cannot be built
/// without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum RecordData {
    /// A record: maps a hostname to an IPv4 address.
    A {
        /// IPv4 address (e.g., `"1.2.3.4"`).
        address: String,
    },

    /// AAAA record: maps a hostname to an IPv6 address.
    AAAA {
        /// IPv6 address (e.g., `"2001:db8::1"`).
        address: String,
    },

    /// CNAME record: alias from one name to another.
    CNAME {
        /// Target hostname.
        target: String,
    },

    /// MX record: mail exchange server.
    MX {
        /// Priority (lower = preferred).
        priority: u16,
        /// Mail server hostname.
        exchange: String,
    },

    /// TXT record: arbitrary text data.
    TXT {
        /// Text content.
        text: String,
    },

    /// NS record: authoritative name server.
    NS {
        /// Name server hostname.
        nameserver: String,
    },

    /// SRV record: service locator.
    SRV {
        /// Priority (lower = preferred).
        priority: u16,
        /// Weight for load balancing among same-priority targets.
        weight: u16,
        /// TCP/UDP port number.
        port: u16,
        /// Target hostname providing the service.
        target: String,
    },

    /// CAA record: Certificate Authority Authorization.
    CAA {
        /// Issuer critical flag (0 or 128).
        flags: u8,
        /// Property tag (`"issue"`, `"issuewild"`, or `"iodef"`).
        tag: String,
        /// CA domain or reporting URI.
        value: String,
    },
}

impl RecordData {
    /// Returns the [`DnsRecordType`] discriminant for this record data.
    pub fn record_type(&self) -> DnsRecordType {
        match self {
            Self::A { .. } => DnsRecordType::A,
            Self::AAAA { .. } => DnsRecordType::Aaaa,
            Self::CNAME { .. } => DnsRecordType::Cname,
            Self::MX { .. } => DnsRecordType::Mx,
            Self::TXT { .. } => DnsRecordType::Txt,
            Self::NS { .. } => DnsRecordType::Ns,
            Self::SRV { .. } => DnsRecordType::Srv,
            Self::CAA { .. } => DnsRecordType::Caa,
        }
    }

    /// Returns the primary display value for this record (e.g., the IP address for A/AAAA,
    /// the target for CNAME/SRV, the exchange for MX).
    pub fn display_value(&self) -> &str {
        match self {
            Self::A { address } | Self::AAAA { address } => address,
            Self::CNAME { target } | Self::SRV { target, .. } => target,
            Self::MX { exchange, .. } => exchange,
            Self::TXT { text } => text,
            Self::NS { nameserver } => nameserver,
            Self::CAA { value, .. } => value,
        }
    }

    /// Priority of MX and SRV records.
    pub fn priority(&self) -> Option<u16> {
        match self {
            Self::MX { priority, .. } | Self::SRV { priority, .. } => Some(*priority),
            _ => None,
        }
    }

    /// Canonical content used as part of the record's natural key.
    ///
    /// Priority is not part of the content; it is a mutable attribute of the key.
    pub fn content(&self) -> String {
        match self {
            Self::A { address } | Self::AAAA { address } => canonical_ip(address),
            Self::CNAME { target } => canonical_hostname(target),
            Self::MX { exchange, .. } => canonical_hostname(exchange),
            Self::TXT { text } => canonical_txt(text),
            Self::NS { nameserver } => canonical_hostname(nameserver),
            Self::SRV {
                weight,
                port,
                target,
                ..
            } => format!("{weight} {port} {}", canonical_hostname(target)),
            Self::CAA { flags, tag, value } => {
                format!("{flags} {} \"{value}\"", tag.to_ascii_lowercase())
            }
        }
    }

    /// Applies `f` to every free-form string field, keeping numeric fields as they are.
    pub fn try_map_strings<E>(
        &self,
        mut f: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<Self, E> {
        Ok(match self {
            Self::A { address } => Self::A {
                address: f(address)?,
            },
            Self::AAAA { address } => Self::AAAA {
                address: f(address)?,
            },
            Self::CNAME { target } => Self::CNAME { target: f(target)? },
            Self::MX { priority, exchange } => Self::MX {
                priority: *priority,
                exchange: f(exchange)?,
            },
            Self::TXT { text } => Self::TXT { text: f(text)? },
            Self::NS { nameserver } => Self::NS {
                nameserver: f(nameserver)?,
            },
            Self::SRV {
                priority,
                weight,
                port,
                target,
            } => Self::SRV {
                priority: *priority,
                weight: *weight,
                port: *port,
                target: f(target)?,
            },
            Self::CAA { flags, tag, value } => Self::CAA {
                flags: *flags,
                tag: f(tag)?,
                value: f(value)?,
            },
        })
    }

    /// Checks the type-specific syntax of the data.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        match self {
            Self::A { address } => address
                .trim()
                .parse::<Ipv4Addr>()
                .map(|_| ())
                .map_err(|_| RecordValidationError::InvalidAddress {
                    record_type: DnsRecordType::A,
                    value: address.clone(),
                }),
            Self::AAAA { address } => address
                .trim()
                .parse::<Ipv6Addr>()
                .map(|_| ())
                .map_err(|_| RecordValidationError::InvalidAddress {
                    record_type: DnsRecordType::Aaaa,
                    value: address.clone(),
                }),
            Self::CNAME { target } => check_hostname("target", target),
            Self::MX { exchange, .. } => check_hostname("exchange", exchange),
            Self::NS { nameserver } => check_hostname("nameserver", nameserver),
            Self::SRV { target, .. } => check_hostname("target", target),
            Self::TXT { text } => {
                let canonical = canonical_txt(text);
                if canonical.is_empty() {
                    Err(RecordValidationError::InvalidText {
                        reason: "TXT content must not be empty".to_string(),
                    })
                } else if canonical.len() > MAX_TXT_LEN {
                    Err(RecordValidationError::InvalidText {
                        reason: format!(
                            "TXT content is {} bytes, limit is {MAX_TXT_LEN}",
                            canonical.len()
                        ),
                    })
                } else {
                    Ok(())
                }
            }
            Self::CAA { flags, tag, value } => {
                if *flags != 0 && *flags != 128 {
                    return Err(RecordValidationError::InvalidCaa {
                        reason: format!("flags must be 0 or 128, got {flags}"),
                    });
                }
                if !matches!(
                    tag.to_ascii_lowercase().as_str(),
                    "issue" | "issuewild" | "iodef"
                ) {
                    return Err(RecordValidationError::InvalidCaa {
                        reason: format!("unsupported tag '{tag}'"),
                    });
                }
                if value.trim().is_empty() {
                    return Err(RecordValidationError::InvalidCaa {
                        reason: "value must not be empty".to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}

/// A DNS record, either live (with a provider id) or desired (without one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    /// Provider-specific record identifier. Absent for desired records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Fully-qualified record name, lower-case, no trailing dot.
    pub name: String,
    /// Time to live in seconds. `1` means "automatic".
    pub ttl: u32,
    /// Type-specific record data.
    pub data: RecordData,

    /// Whether the Cloudflare proxy is enabled. `None` on a desired record means "don't care".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,

    /// When the record was created, if known.
    #[serde(default, with = "crate::utils::datetime")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,

    /// When the record was last updated, if known.
    #[serde(default, with = "crate::utils::datetime")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// TTL value meaning "let the provider decide".
pub const TTL_AUTOMATIC: u32 = 1;
/// Smallest explicit TTL accepted.
pub const MIN_TTL: u32 = 30;
/// Largest TTL accepted.
pub const MAX_TTL: u32 = 86_400;

impl DnsRecord {
    /// A desired record; the name is normalised to lower-case without a trailing dot.
    pub fn new(name: &str, ttl: u32, data: RecordData) -> Self {
        Self {
            id: None,
            name: canonical_hostname(name),
            ttl,
            data,
            proxied: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_proxied(mut self, proxied: Option<bool>) -> Self {
        self.proxied = proxied;
        self
    }

    pub fn record_type(&self) -> DnsRecordType {
        self.data.record_type()
    }

    /// Natural key: type, canonical name and canonical content.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            record_type: self.data.record_type(),
            name: canonical_hostname(&self.name),
            content: self.data.content(),
        }
    }

    /// Validates the name, the TTL and the type-specific data.
    pub fn validate(&self) -> Result<(), RecordValidationError> {
        check_record_name(&self.name)?;
        if self.ttl != TTL_AUTOMATIC && !(MIN_TTL..=MAX_TTL).contains(&self.ttl) {
            return Err(RecordValidationError::InvalidTtl { ttl: self.ttl });
        }
        self.data.validate()
    }
}

/// Identity of a record independent of its mutable attributes (TTL, priority, proxied).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub record_type: DnsRecordType,
    pub name: String,
    pub content: String,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.record_type, self.name, self.content)
    }
}

// ============ Canonical forms ============

/// Lower-case, surrounding whitespace and trailing dot removed.
pub fn canonical_hostname(value: &str) -> String {
    value.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Re-renders an IP literal in its canonical textual form; other input is returned trimmed.
pub fn canonical_ip(value: &str) -> String {
    let trimmed = value.trim();
    if let Ok(v4) = trimmed.parse::<Ipv4Addr>() {
        v4.to_string()
    } else if let Ok(v6) = trimmed.parse::<Ipv6Addr>() {
        v6.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

/// Removes surrounding quotes and joins quoted character-string chunks.
///
/// `"v=spf1 " "-all"` becomes `v=spf1 -all`; an unquoted value is returned trimmed.
pub fn canonical_txt(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        if let Some(joined) = join_quoted_chunks(trimmed) {
            return joined;
        }
        return trimmed[1..trimmed.len() - 1].to_string();
    }
    trimmed.to_string()
}

/// Parses a sequence of `"..."` chunks separated by whitespace.
fn join_quoted_chunks(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    loop {
        match chars.next() {
            None => return Some(out),
            Some(c) if c.is_whitespace() => {}
            Some('"') => loop {
                match chars.next()? {
                    '"' => break,
                    '\\' => out.push(chars.next()?),
                    c => out.push(c),
                }
            },
            Some(_) => return None,
        }
    }
}

fn check_hostname(field: &'static str, value: &str) -> Result<(), RecordValidationError> {
    hostname_problem(value, false).map_or(Ok(()), |reason| {
        Err(RecordValidationError::InvalidHostname {
            field,
            value: value.to_string(),
            reason,
        })
    })
}

fn check_record_name(value: &str) -> Result<(), RecordValidationError> {
    hostname_problem(value, true).map_or(Ok(()), |reason| {
        Err(RecordValidationError::InvalidHostname {
            field: "name",
            value: value.to_string(),
            reason,
        })
    })
}

/// Returns a description of the first syntax problem, if any.
///
/// Underscores are accepted so that `_dmarc` and `selector._domainkey` names pass.
fn hostname_problem(value: &str, allow_wildcard: bool) -> Option<String> {
    let name = value.trim().trim_end_matches('.');
    if name.is_empty() {
        return Some("must not be empty".to_string());
    }
    if name.len() > 253 {
        return Some(format!("{} characters exceeds 253", name.len()));
    }
    for (i, label) in name.split('.').enumerate() {
        if label.is_empty() {
            return Some("contains an empty label".to_string());
        }
        if label.len() > 63 {
            return Some(format!("label '{label}' exceeds 63 characters"));
        }
        if allow_wildcard && i == 0 && label == "*" {
            continue;
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Some(format!("label '{label}' starts or ends with '-'"));
        }
        if let Some(bad) = label
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Some(format!("invalid character '{bad}'"));
        }
    }
    None
}

/// Validation error for a single record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RecordValidationError {
    /// An A/AAAA address is not a valid literal of its family.
    InvalidAddress {
        record_type: DnsRecordType,
        value: String,
    },
    /// A name or hostname field is syntactically invalid.
    InvalidHostname {
        field: &'static str,
        value: String,
        reason: String,
    },
    /// TXT content is empty or too long.
    InvalidText { reason: String },
    /// CAA flags, tag or value are invalid.
    InvalidCaa { reason: String },
    /// TTL outside the accepted range.
    InvalidTtl { ttl: u32 },
}

impl std::fmt::Display for RecordValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress { record_type, value } => {
                write!(f, "'{value}' is not a valid {record_type} address")
            }
            Self::InvalidHostname {
                field,
                value,
                reason,
            } => write!(f, "{field} '{value}': {reason}"),
            Self::InvalidText { reason } => write!(f, "{reason}"),
            Self::InvalidCaa { reason } => write!(f, "CAA {reason}"),
            Self::InvalidTtl { ttl } => write!(
                f,
                "TTL {ttl} must be {TTL_AUTOMATIC} (automatic) or within {MIN_TTL}..={MAX_TTL}"
            ),
        }
    }
}

impl std::error::Error for RecordValidationError {}

// ============ Credentials ============

/// Validation error for provider credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CredentialValidationError {
    /// A credential field is present but empty/whitespace-only.
    EmptyField {
        /// Machine-readable field key.
        field: String,
        /// Human-readable field label.
        label: String,
    },
}

impl std::fmt::Display for CredentialValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyField { label, .. } => write!(f, "Field must not be empty: {label}"),
        }
    }
}

impl std::error::Error for CredentialValidationError {}

/// Type-safe credential container.
///
/// Serialized as a tagged enum with `"provider"` as the tag and `"credentials"` as the content:
///
/// ```json
/// { "provider": "cloudflare", "credentials": { "api_token": "..." } }
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "provider", content = "credentials")]
pub enum ProviderCredentials {
    /// Cloudflare API token credentials. Requires feature `cloudflare`.
    #[cfg(feature = "cloudflare")]
    #[serde(rename = "cloudflare")]
    Cloudflare {
        /// Cloudflare API token.
        api_token: String,
    },
}

impl ProviderCredentials {
    /// Rejects empty credential fields.
    pub fn validate(&self) -> Result<(), CredentialValidationError> {
        match self {
            #[cfg(feature = "cloudflare")]
            Self::Cloudflare { api_token } if api_token.trim().is_empty() => {
                Err(CredentialValidationError::EmptyField {
                    field: "apiToken".to_string(),
                    label: "API Token".to_string(),
                })
            }
            #[allow(unreachable_patterns)]
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            #[cfg(feature = "cloudflare")]
            Self::Cloudflare { ref api_token } => f
                .debug_struct("Cloudflare")
                .field(
                    "api_token",
                    &crate::utils::log_sanitizer::mask_secret(api_token),
                )
                .finish(),
        }
    }
}
