//! 业务逻辑服务层

pub mod mail_audit;
pub mod mail_dns;
pub mod reconciler;
pub mod record_store;
pub mod zone_locks;
pub mod zone_resolver;

pub use mail_audit::{audit_records, MailAuditReport};
pub use mail_dns::{check_mail_dns, MailCheck, MailDnsOptions, MailDnsReport, MailHealth};
pub use reconciler::{plan_operations, Reconciler, DEFAULT_RECORD_TTL};
pub use record_store::{records_cache_key, CreateOutcome, DeleteOutcome, RecordStore, DEFAULT_RECORDS_CACHE_TTL};
pub use zone_locks::{ZoneGuard, ZoneLocks};
pub use zone_resolver::{ZoneResolver, DEFAULT_ZONE_CACHE_TTL};
