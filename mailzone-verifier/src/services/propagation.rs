//! Multi-resolver consensus and the convergence state machine.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use mailzone_provider::DnsRecordType;
use tokio::time::{sleep_until, timeout, timeout_at, Instant};

use crate::error::{LookupError, VerifierError, VerifierResult};
use crate::types::{
    ObservationOutcome, PropagationQuery, PropagationResult, PropagationStatus, ResolverEndpoint,
    ResolverObservation, VerifierOptions,
};

use super::normalize::{normalize_answer, normalize_value};
use super::resolver::{default_panel, HickoryRecordResolver, RecordResolver};
use super::{validate_name, validate_query};

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Aggregate of one fan-out over the panel.
#[derive(Debug, Clone)]
struct Pass {
    observations: Vec<ResolverObservation>,
    responders: usize,
    matching: usize,
    ratio: f64,
    /// Normalised answers of every responder, keyed by resolver address.
    signature: String,
}

impl Pass {
    fn from_observations(observations: Vec<ResolverObservation>) -> Self {
        let responders = observations.iter().filter(|o| o.responded()).count();
        let matching = observations.iter().filter(|o| o.matches).count();

        // usize -> f64: panel sizes are tiny
        #[allow(clippy::cast_precision_loss)]
        let ratio = if responders == 0 {
            0.0
        } else {
            matching as f64 / responders as f64
        };

        let answers: BTreeMap<String, String> = observations
            .iter()
            .filter_map(|o| match &o.outcome {
                ObservationOutcome::Answered(values) => {
                    Some((o.resolver.ip.to_string(), values.join("|")))
                }
                _ => None,
            })
            .collect();
        let signature = answers
            .iter()
            .map(|(ip, values)| format!("{ip}={values}"))
            .collect::<Vec<_>>()
            .join(";");

        Self {
            observations,
            responders,
            matching,
            ratio,
            signature,
        }
    }
}

/// Tracks the current run of identical, quorate, non-converged passes.
#[derive(Debug, Default)]
struct StabilityHistory {
    run: Option<(Instant, String)>,
}

impl StabilityHistory {
    fn observe(&mut self, at: Instant, pass: &Pass, options: &VerifierOptions) {
        let stuck =
            pass.responders >= options.min_quorum && pass.ratio < options.convergence_threshold;
        if !stuck {
            self.run = None;
            return;
        }
        match &self.run {
            Some((_, signature)) if *signature == pass.signature => {}
            _ => self.run = Some((at, pass.signature.clone())),
        }
    }

    fn diverged(&self, now: Instant, window: Duration) -> bool {
        self.run
            .as_ref()
            .is_some_and(|(since, _)| now.duration_since(*since) >= window)
    }
}

/// Checks whether a record is visible across a panel of recursive resolvers.
pub struct PropagationVerifier {
    resolvers: Vec<Arc<dyn RecordResolver>>,
    options: VerifierOptions,
}

impl PropagationVerifier {
    pub fn new(
        resolvers: Vec<Arc<dyn RecordResolver>>,
        options: VerifierOptions,
    ) -> VerifierResult<Self> {
        if resolvers.is_empty() {
            return Err(VerifierError::InvalidConfig(
                "resolver panel is empty".to_string(),
            ));
        }
        validate_options(&options)?;
        Ok(Self { resolvers, options })
    }

    /// Verifier over the built-in public resolver panel.
    pub fn with_default_panel(options: VerifierOptions) -> VerifierResult<Self> {
        Self::with_endpoints(&default_panel(), options)
    }

    /// Verifier over hickory resolvers for `endpoints`.
    pub fn with_endpoints(
        endpoints: &[ResolverEndpoint],
        options: VerifierOptions,
    ) -> VerifierResult<Self> {
        let resolvers = HickoryRecordResolver::panel(endpoints, options.query_timeout);
        Self::new(resolvers, options)
    }

    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    pub fn endpoints(&self) -> Vec<ResolverEndpoint> {
        self.resolvers.iter().map(|r| r.endpoint().clone()).collect()
    }

    /// Current answer for `name`, normalised, from the first panel resolver that answers.
    pub async fn lookup(
        &self,
        name: &str,
        record_type: DnsRecordType,
    ) -> VerifierResult<Vec<String>> {
        let name = validate_name(name)?;
        let values = self
            .first_answer(&format!("{record_type} {name}"), |resolver| {
                resolver.query(&name, record_type)
            })
            .await?;
        Ok(normalize_answer(record_type, &values))
    }

    /// PTR names of `ip` from the first panel resolver that answers.
    pub async fn reverse_lookup(&self, ip: IpAddr) -> VerifierResult<Vec<String>> {
        let names = self
            .first_answer(&format!("PTR {ip}"), |resolver| resolver.reverse(ip))
            .await?;
        Ok(normalize_answer(DnsRecordType::Cname, &names))
    }

    async fn first_answer<'a, F, Fut>(&'a self, what: &str, ask: F) -> VerifierResult<Vec<String>>
    where
        F: Fn(&'a dyn RecordResolver) -> Fut,
        Fut: Future<Output = Result<Vec<String>, LookupError>>,
    {
        for resolver in &self.resolvers {
            match timeout(self.options.query_timeout, ask(resolver.as_ref())).await {
                Ok(Ok(values)) => return Ok(values),
                Ok(Err(e)) => log::debug!(
                    "[verifier] {} failed {what}: {e}",
                    resolver.endpoint().name
                ),
                Err(_) => log::debug!(
                    "[verifier] {} timed out on {what}",
                    resolver.endpoint().name
                ),
            }
        }
        Err(VerifierError::Unresolved(what.to_string()))
    }

    /// Runs a single pass. The status is either `Converged` or `Pending`.
    pub async fn verify(&self, query: &PropagationQuery) -> VerifierResult<PropagationResult> {
        self.verify_with(query, &self.options).await
    }

    /// [`Self::verify`] with options that replace the verifier's own for this call.
    pub async fn verify_with(
        &self,
        query: &PropagationQuery,
        options: &VerifierOptions,
    ) -> VerifierResult<PropagationResult> {
        validate_options(options)?;
        let query = validate_query(query)?;
        let started = Instant::now();
        let pass = self.run_pass(&query, options).await;
        let status = if converged(&pass, options) {
            PropagationStatus::Converged
        } else {
            PropagationStatus::Pending
        };
        log::debug!(
            "[verifier] {query}: {}/{} responders agree ({status:?})",
            pass.matching,
            pass.responders
        );
        Ok(Self::result(query, status, Some(pass), 1, started))
    }

    /// Polls until the query converges, is found divergent, or `max_wait` elapses.
    pub async fn await_convergence(
        &self,
        query: &PropagationQuery,
    ) -> VerifierResult<PropagationResult> {
        self.await_convergence_with(query, &self.options).await
    }

    /// [`Self::await_convergence`] with options that replace the verifier's own for this call.
    pub async fn await_convergence_with(
        &self,
        query: &PropagationQuery,
        options: &VerifierOptions,
    ) -> VerifierResult<PropagationResult> {
        validate_options(options)?;
        let query = validate_query(query)?;
        let started = Instant::now();
        let deadline = started + options.max_wait;
        let mut history = StabilityHistory::default();
        let mut interval = options.initial_interval;
        let mut passes = 0_u32;
        let mut last: Option<Pass> = None;

        log::info!(
            "[verifier] waiting for {query} (max {}s)",
            options.max_wait.as_secs()
        );

        loop {
            let pass_started = Instant::now();
            let Ok(pass) = timeout_at(deadline, self.run_pass(&query, options)).await else {
                break;
            };
            passes += 1;
            history.observe(pass_started, &pass, options);

            let status = if converged(&pass, options) {
                PropagationStatus::Converged
            } else if history.diverged(pass_started, options.min_observation_window) {
                PropagationStatus::Divergent
            } else {
                PropagationStatus::Pending
            };

            log::debug!(
                "[verifier] {query} pass {passes}: {}/{} agree",
                pass.matching,
                pass.responders
            );

            if status.is_terminal() {
                let result = Self::result(query, status, Some(pass), passes, started);
                match status {
                    PropagationStatus::Converged => log::info!(
                        "[verifier] {} converged after {} passes in {}ms",
                        result.query,
                        passes,
                        result.elapsed_ms
                    ),
                    _ => log::warn!(
                        "[verifier] {} is divergent: answers stable at {:.0}% agreement",
                        result.query,
                        result.agreement_ratio * 100.0
                    ),
                }
                return Ok(result);
            }
            last = Some(pass);

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep_until((now + interval).min(deadline)).await;
            if Instant::now() >= deadline {
                break;
            }
            interval = (interval * 2).min(options.max_interval);
        }

        let result = Self::result(query, PropagationStatus::Timeout, last, passes, started);
        log::warn!(
            "[verifier] {} timed out after {} passes ({:.0}% agreement)",
            result.query,
            passes,
            result.agreement_ratio * 100.0
        );
        Ok(result)
    }

    /// Single pass over several queries, concurrently.
    pub async fn verify_many(
        &self,
        queries: &[PropagationQuery],
    ) -> VerifierResult<Vec<PropagationResult>> {
        for query in queries {
            validate_query(query)?;
        }
        join_all(queries.iter().map(|q| self.verify(q)))
            .await
            .into_iter()
            .collect()
    }

    /// Awaits convergence of several queries, concurrently.
    pub async fn await_many(
        &self,
        queries: &[PropagationQuery],
    ) -> VerifierResult<Vec<PropagationResult>> {
        for query in queries {
            validate_query(query)?;
        }
        join_all(queries.iter().map(|q| self.await_convergence(q)))
            .await
            .into_iter()
            .collect()
    }

    async fn run_pass(&self, query: &PropagationQuery, options: &VerifierOptions) -> Pass {
        let expected = normalize_value(query.record_type, &query.expected_value);
        let query_timeout = options.query_timeout;

        let futures = self.resolvers.iter().map(|resolver| {
            let expected = expected.as_str();
            async move {
                let query_start = Instant::now();
                let result = timeout(
                    query_timeout,
                    resolver.query(&query.name, query.record_type),
                )
                .await;
                let latency_ms = duration_ms(query_start.elapsed());

                let outcome = match result {
                    Ok(Ok(values)) => {
                        ObservationOutcome::Answered(normalize_answer(query.record_type, &values))
                    }
                    Ok(Err(e)) => ObservationOutcome::Error(e.to_string()),
                    Err(_) => ObservationOutcome::Timeout,
                };
                let matches = matches!(
                    &outcome,
                    ObservationOutcome::Answered(values) if values.iter().any(|v| v == expected)
                );

                ResolverObservation {
                    resolver: resolver.endpoint().clone(),
                    outcome,
                    latency_ms,
                    matches,
                }
            }
        });

        Pass::from_observations(join_all(futures).await)
    }

    fn result(
        query: PropagationQuery,
        status: PropagationStatus,
        pass: Option<Pass>,
        passes: u32,
        started: Instant,
    ) -> PropagationResult {
        let (observations, responders, matching, agreement_ratio) = pass.map_or_else(
            || (Vec::new(), 0, 0, 0.0),
            |p| (p.observations, p.responders, p.matching, p.ratio),
        );
        PropagationResult {
            query,
            status,
            observations,
            agreement_ratio,
            responders,
            matching,
            passes,
            elapsed_ms: duration_ms(started.elapsed()),
        }
    }
}

fn converged(pass: &Pass, options: &VerifierOptions) -> bool {
    pass.responders >= options.min_quorum && pass.ratio >= options.convergence_threshold
}

fn validate_options(options: &VerifierOptions) -> VerifierResult<()> {
    let threshold = options.convergence_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(VerifierError::InvalidConfig(format!(
            "convergence threshold must be in (0, 1], got {threshold}"
        )));
    }
    if options.min_quorum == 0 {
        return Err(VerifierError::InvalidConfig(
            "min quorum must be at least 1".to_string(),
        ));
    }
    if options.min_observation_window > options.max_wait {
        return Err(VerifierError::InvalidConfig(
            "observation window is longer than max wait".to_string(),
        ));
    }
    if options.initial_interval.is_zero() || options.query_timeout.is_zero() {
        return Err(VerifierError::InvalidConfig(
            "poll interval and query timeout must be positive".to_string(),
        ));
    }
    Ok(())
}
