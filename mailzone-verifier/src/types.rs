//! Propagation query and result types.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use mailzone_provider::{DnsRecord, DnsRecordType, RecordData};
use serde::{Deserialize, Serialize};

// ============ Resolver panel ============

/// A public recursive resolver queried during propagation checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverEndpoint {
    pub name: String,
    pub ip: IpAddr,
    pub region: String,
}

impl ResolverEndpoint {
    pub fn new(name: impl Into<String>, ip: IpAddr, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip,
            region: region.into(),
        }
    }
}

impl fmt::Display for ResolverEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.ip)
    }
}

// ============ Query ============

/// One `(name, type, expected value)` tuple to verify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationQuery {
    pub name: String,
    pub record_type: DnsRecordType,
    /// Value in resolver presentation form, e.g. `10 mx.example.com` for MX.
    pub expected_value: String,
}

impl PropagationQuery {
    pub fn new(
        name: impl Into<String>,
        record_type: DnsRecordType,
        expected_value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            record_type,
            expected_value: expected_value.into(),
        }
    }

    /// Builds the query that confirms `record` is visible.
    ///
    /// MX and SRV carry their priority in front of the content, the way resolvers render them.
    pub fn for_record(record: &DnsRecord) -> Self {
        let expected_value = match &record.data {
            RecordData::MX { priority, .. } | RecordData::SRV { priority, .. } => {
                format!("{priority} {}", record.data.content())
            }
            data => data.content(),
        };
        Self::new(record.name.clone(), record.record_type(), expected_value)
    }
}

impl fmt::Display for PropagationQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.record_type, self.name, self.expected_value
        )
    }
}

// ============ Observations ============

/// What a single resolver returned during one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum ObservationOutcome {
    /// Normalised answer values. Empty for NXDOMAIN or NODATA.
    Answered(Vec<String>),
    Error(String),
    Timeout,
}

/// Per-resolver observation of one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverObservation {
    pub resolver: ResolverEndpoint,
    pub outcome: ObservationOutcome,
    pub latency_ms: u64,
    /// Whether the expected value is among the answers.
    pub matches: bool,
}

impl ResolverObservation {
    /// Errors and timeouts do not count as responses.
    pub fn responded(&self) -> bool {
        matches!(self.outcome, ObservationOutcome::Answered(_))
    }
}

/// Propagation state of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropagationStatus {
    Pending,
    Converged,
    Divergent,
    Timeout,
}

impl PropagationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Outcome of a verification (single pass or a full convergence wait).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationResult {
    pub query: PropagationQuery,
    pub status: PropagationStatus,
    /// Observations of the last pass.
    pub observations: Vec<ResolverObservation>,
    /// `matching / responders`, 0 when nobody responded.
    pub agreement_ratio: f64,
    pub responders: usize,
    pub matching: usize,
    /// Number of passes executed.
    pub passes: u32,
    pub elapsed_ms: u64,
}

// ============ Options ============

/// Tuning for consensus and polling.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifierOptions {
    /// Per-resolver query timeout.
    pub query_timeout: Duration,
    /// Agreement ratio required for convergence, in `(0, 1]`.
    pub convergence_threshold: f64,
    /// Minimum number of responding resolvers for a verdict.
    pub min_quorum: usize,
    /// Stable disagreement must last this long before a query is declared divergent.
    pub min_observation_window: Duration,
    pub max_wait: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            convergence_threshold: 1.0,
            min_quorum: 3,
            min_observation_window: Duration::from_secs(120),
            max_wait: Duration::from_secs(1800),
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
        }
    }
}
