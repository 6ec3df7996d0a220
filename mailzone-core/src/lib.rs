//! mailzone core library
//!
//! Keeps the DNS records of mail-sending domains in line with declarative templates
//! and confirms that changes are visible on public resolvers:
//! - zone resolution with a cached account zone map
//! - cached record listing through a two-tier result cache
//! - diff-based reconciliation with ordered, per-zone serialised writes
//! - consensus propagation checks over a resolver panel
//! - mail record audits (MX / SPF / DMARC / DKIM)
//!
//! ```rust,no_run
//! use mailzone_core::{DnsEngine, EngineConfig, MailTemplateParams, Template};
//!
//! # async fn run() -> mailzone_core::CoreResult<()> {
//! let engine = DnsEngine::from_config(EngineConfig::from_file("mailzone.toml")?).await?;
//! let template = Template::mail_domain("example.com", MailTemplateParams::new("192.0.2.10"));
//!
//! let plan = engine.reconcile(&template, None).await?;
//! for step in plan.steps() {
//!     println!("{step}");
//! }
//! engine.apply(&plan, None).await?;
//! for result in engine.await_plan_propagation(&plan).await? {
//!     println!("{} -> {:?}", result.query, result.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod services;
pub mod traits;
pub mod types;

#[cfg(test)]
mod test_utils;

// Re-export common types
pub use cache::{CacheOptions, CacheRefresher, CacheStats, ResultCache};
pub use config::EngineConfig;
pub use engine::{deadline_in, plan_queries, Deadline, DnsEngine};
pub use error::{CoreError, CoreResult};
pub use services::{MailAuditReport, MailCheck, MailDnsOptions, MailDnsReport, MailHealth};
pub use traits::{Clock, InMemorySharedTier, ManualClock, SharedTier, SystemClock};
pub use types::{
    ApplyReport, ApplyStatus, MailTemplateParams, Operation, OperationKind, ReconciliationPlan,
    Template, TemplateRecord, Zone,
};

// Re-export the provider and verifier APIs used alongside the engine
pub use mailzone_provider::{DnsProvider, DnsRecord, DnsRecordType, RecordData};
pub use mailzone_verifier::{
    PropagationQuery, PropagationResult, PropagationStatus, PropagationVerifier, VerifierOptions,
};
