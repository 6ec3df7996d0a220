//! Engine façade
//!
//! `DnsEngine` wires the provider, the result cache, the zone resolver, the reconciler
//! and the propagation verifier together. Every operation that talks to the provider
//! accepts a [`Deadline`]; when it passes, the in-flight work is dropped and the
//! operation returns [`CoreError::Cancelled`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mailzone_provider::{create_provider, canonical_hostname, DnsProvider, ProviderCredentials};
use mailzone_verifier::{
    PropagationQuery, PropagationResult, PropagationVerifier, VerifierOptions,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::{CacheRefresher, CacheStats, ResultCache};
use crate::config::EngineConfig;
use crate::error::{CoreError, CoreResult};
use crate::services::{
    audit_records, check_mail_dns, records_cache_key, MailAuditReport, MailDnsOptions,
    MailDnsReport, Reconciler, RecordStore, ZoneLocks, ZoneResolver,
};
use crate::types::{ApplyReport, OperationKind, ReconciliationPlan, Template, Zone};

/// Absolute point in time after which an operation is abandoned. `None` waits indefinitely.
pub type Deadline = Option<tokio::time::Instant>;

/// Deadline `after` from now.
pub fn deadline_in(after: Duration) -> Deadline {
    Some(tokio::time::Instant::now() + after)
}

async fn within<T>(
    deadline: Deadline,
    operation: &str,
    fut: impl Future<Output = CoreResult<T>>,
) -> CoreResult<T> {
    let Some(at) = deadline else {
        return fut.await;
    };
    if let Ok(result) = tokio::time::timeout_at(at, fut).await {
        result
    } else {
        log::warn!("[engine] {operation} cancelled: deadline expired");
        Err(CoreError::Cancelled(format!("{operation} exceeded its deadline")))
    }
}

/// DNS reconciliation and propagation engine.
pub struct DnsEngine {
    cache: Arc<ResultCache>,
    zones: Arc<ZoneResolver>,
    records: Arc<RecordStore>,
    reconciler: Reconciler,
    verifier: Arc<PropagationVerifier>,
    prefetch_interval: Duration,
}

impl std::fmt::Debug for DnsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsEngine")
            .field("prefetch_interval", &self.prefetch_interval)
            .finish_non_exhaustive()
    }
}

impl DnsEngine {
    /// Engine over injected parts; cache TTLs and defaults come from `config`.
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        verifier: PropagationVerifier,
        cache: Arc<ResultCache>,
        config: &EngineConfig,
    ) -> Self {
        let zones = Arc::new(ZoneResolver::new(provider.clone(), config.zone_cache_ttl()));
        let records = Arc::new(RecordStore::new(
            provider,
            cache.clone(),
            config.records_cache_ttl(),
        ));
        let reconciler = Reconciler::new(
            zones.clone(),
            records.clone(),
            Arc::new(ZoneLocks::new()),
            config.dns.default_ttl,
        );
        Self {
            cache,
            zones,
            records,
            reconciler,
            verifier: Arc::new(verifier),
            prefetch_interval: config.prefetch_interval(),
        }
    }

    /// Builds the Cloudflare provider, the resolver panel and the cache tiers from `config`.
    ///
    /// Environment overrides are applied before validation.
    pub async fn from_config(mut config: EngineConfig) -> CoreResult<Self> {
        config.apply_env_overrides();
        config.validate()?;

        let api_token = config.api.token.clone().unwrap_or_default();
        let provider = create_provider(
            ProviderCredentials::Cloudflare { api_token },
            &config.client_settings(),
        )?;

        let options = config.verifier_options();
        let verifier = if config.propagation.resolvers.is_empty() {
            PropagationVerifier::with_default_panel(options)?
        } else {
            PropagationVerifier::with_endpoints(&config.propagation.resolvers, options)?
        };

        let cache = ResultCache::new(config.cache_options());
        let cache = Self::attach_shared_tier(cache, &config).await?;

        log::info!(
            "[engine] ready: {} resolvers, shared cache {}",
            verifier.endpoints().len(),
            if config.cache.redis_url.is_some() { "on" } else { "off" }
        );
        Ok(Self::new(provider, verifier, Arc::new(cache), &config))
    }

    #[cfg(feature = "redis")]
    async fn attach_shared_tier(cache: ResultCache, config: &EngineConfig) -> CoreResult<ResultCache> {
        match &config.cache.redis_url {
            Some(url) => {
                let tier = crate::cache::RedisTier::connect(url).await?;
                Ok(cache.with_shared_tier(Arc::new(tier)))
            }
            None => Ok(cache),
        }
    }

    #[cfg(not(feature = "redis"))]
    #[allow(clippy::unused_async)]
    async fn attach_shared_tier(cache: ResultCache, config: &EngineConfig) -> CoreResult<ResultCache> {
        if config.cache.redis_url.is_some() {
            log::warn!("[engine] cache.redis_url is set but the `redis` feature is disabled");
        }
        Ok(cache)
    }

    pub fn verifier(&self) -> &PropagationVerifier {
        &self.verifier
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Zone holding `domain`.
    pub async fn resolve_zone(&self, domain: &str, deadline: Deadline) -> CoreResult<Zone> {
        within(deadline, "resolve_zone", self.zones.resolve_zone(domain, false)).await
    }

    /// Plans the writes that bring the zone in line with `template`.
    pub async fn reconcile(
        &self,
        template: &Template,
        deadline: Deadline,
    ) -> CoreResult<ReconciliationPlan> {
        within(deadline, "reconcile", self.reconciler.reconcile(template)).await
    }

    /// Applies `plan`; see [`Reconciler::apply`].
    pub async fn apply(
        &self,
        plan: &ReconciliationPlan,
        deadline: Deadline,
    ) -> CoreResult<ApplyReport> {
        within(deadline, "apply", self.reconciler.apply(plan)).await
    }

    /// One consensus pass over the resolver panel.
    pub async fn verify(
        &self,
        query: &PropagationQuery,
        deadline: Deadline,
    ) -> CoreResult<PropagationResult> {
        within(deadline, "verify", async {
            Ok(self.verifier.verify(query).await?)
        })
        .await
    }

    /// [`Self::verify`] with per-call quorum, threshold and timeouts.
    pub async fn verify_with(
        &self,
        query: &PropagationQuery,
        options: &VerifierOptions,
        deadline: Deadline,
    ) -> CoreResult<PropagationResult> {
        within(deadline, "verify", async {
            Ok(self.verifier.verify_with(query, options).await?)
        })
        .await
    }

    /// Polls until the query converges, diverges or the verifier's `max_wait` elapses.
    pub async fn await_convergence(&self, query: &PropagationQuery) -> CoreResult<PropagationResult> {
        Ok(self.verifier.await_convergence(query).await?)
    }

    /// [`Self::await_convergence`] bounded by `options.max_wait` instead.
    pub async fn await_convergence_with(
        &self,
        query: &PropagationQuery,
        options: &VerifierOptions,
    ) -> CoreResult<PropagationResult> {
        Ok(self.verifier.await_convergence_with(query, options).await?)
    }

    /// Awaits convergence of every record created or updated by `plan`.
    ///
    /// Proxied records are skipped: resolvers answer with the proxy's addresses.
    pub async fn await_plan_propagation(
        &self,
        plan: &ReconciliationPlan,
    ) -> CoreResult<Vec<PropagationResult>> {
        let queries = plan_queries(plan);
        if queries.is_empty() {
            return Ok(Vec::new());
        }
        log::info!(
            "[engine] awaiting propagation of {} records for plan {}",
            queries.len(),
            plan.id
        );
        Ok(self.verifier.await_many(&queries).await?)
    }

    /// Drops the cached record list of the zone holding `domain`.
    pub async fn invalidate_cache(&self, domain: &str) -> CoreResult<usize> {
        let zone = self.zones.resolve_zone(domain, false).await?;
        Ok(self
            .cache
            .invalidate(&records_cache_key(&zone.provider_zone_id))
            .await)
    }

    /// Checks the mail-related records at or below `domain`.
    pub async fn audit_mail_records(
        &self,
        domain: &str,
        deadline: Deadline,
    ) -> CoreResult<MailAuditReport> {
        within(deadline, "audit_mail_records", async {
            let domain = canonical_hostname(domain);
            let zone = self.zones.resolve_zone(&domain, false).await?;
            let records = self.records.list(&zone.provider_zone_id).await?;
            let report = audit_records(&domain, &records);
            log::info!(
                "[engine] mail audit {domain}: {} errors, {} warnings",
                report.errors.len(),
                report.warnings.len()
            );
            Ok(report)
        })
        .await
    }

    /// Checks the mail records of `domain` as public resolvers see them.
    pub async fn check_mail_dns(
        &self,
        domain: &str,
        options: &MailDnsOptions,
        deadline: Deadline,
    ) -> CoreResult<MailDnsReport> {
        within(
            deadline,
            "check_mail_dns",
            check_mail_dns(&self.verifier, domain, options),
        )
        .await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Starts refreshing hot record lists before they expire, until `cancel` fires.
    pub fn spawn_prefetch(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let refresher: Arc<dyn CacheRefresher> = self.records.clone();
        self.cache
            .clone()
            .spawn_prefetch_loop(refresher, self.prefetch_interval, cancel)
    }
}

/// Propagation queries for the records a plan writes.
pub fn plan_queries(plan: &ReconciliationPlan) -> Vec<PropagationQuery> {
    plan.operations
        .iter()
        .filter(|op| matches!(op.kind, OperationKind::Create | OperationKind::Update))
        .filter(|op| op.record.proxied != Some(true))
        .map(|op| PropagationQuery::for_record(&op.record))
        .collect()
}
