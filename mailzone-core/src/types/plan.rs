//! Reconciliation plan and apply report types

use mailzone_provider::{DnsRecord, ErrorClass, RecordKey};
use serde::{Deserialize, Serialize};

use super::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        })
    }
}

/// One provider write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub kind: OperationKind,
    /// Create: the desired record. Update: the desired state carrying the live id.
    /// Delete: the live record.
    pub record: DnsRecord,
    /// Live record an update replaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<DnsRecord>,
    /// Index of an operation that must succeed first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<usize>,
}

impl Operation {
    pub fn create(record: DnsRecord) -> Self {
        Self {
            kind: OperationKind::Create,
            record,
            previous: None,
            depends_on: None,
        }
    }

    pub fn update(record: DnsRecord, previous: DnsRecord) -> Self {
        Self {
            kind: OperationKind::Update,
            record,
            previous: Some(previous),
            depends_on: None,
        }
    }

    pub fn delete(record: DnsRecord) -> Self {
        Self {
            kind: OperationKind::Delete,
            record,
            previous: None,
            depends_on: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        self.record.key()
    }

    /// Human readable step, e.g. `UPDATE A mail.example.com 192.0.2.9 -> 192.0.2.10 (ttl 300)`.
    pub fn describe(&self) -> String {
        let record = &self.record;
        let value = describe_value(record);
        match (&self.kind, &self.previous) {
            (OperationKind::Update, Some(prev)) => format!(
                "UPDATE {} {} {} -> {value} (ttl {})",
                record.record_type(),
                record.name,
                describe_value(prev),
                record.ttl
            ),
            (kind, _) => format!(
                "{kind} {} {} {value} (ttl {})",
                record.record_type(),
                record.name,
                record.ttl
            ),
        }
    }
}

fn describe_value(record: &DnsRecord) -> String {
    match record.data.priority() {
        Some(priority) => format!("{priority} {}", record.data.content()),
        None => record.data.content(),
    }
}

/// Ordered writes that turn live state into the template's record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationPlan {
    pub id: String,
    pub domain: String,
    pub zone: Zone,
    pub operations: Vec<Operation>,
    pub warnings: Vec<String>,
}

impl ReconciliationPlan {
    pub fn new(domain: impl Into<String>, zone: Zone) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            domain: domain.into(),
            zone,
            operations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind == kind).count()
    }

    /// One line per operation.
    pub fn steps(&self) -> Vec<String> {
        self.operations.iter().map(Operation::describe).collect()
    }
}

/// Outcome of one plan operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ApplyStatus {
    Applied,
    /// A delete whose record was already gone.
    AlreadyAbsent,
    /// A create whose record was already live.
    AlreadyPresent,
    Failed { error: String, class: ErrorClass },
    Skipped { reason: String },
}

impl ApplyStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Applied | Self::AlreadyAbsent | Self::AlreadyPresent
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyStep {
    pub index: usize,
    pub kind: OperationKind,
    pub key: RecordKey,
    pub step: String,
    #[serde(flatten)]
    pub status: ApplyStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub plan_id: String,
    pub domain: String,
    pub zone_id: String,
    pub steps: Vec<ApplyStep>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ApplyReport {
    pub fn new(plan: &ReconciliationPlan) -> Self {
        Self {
            plan_id: plan.id.clone(),
            domain: plan.domain.clone(),
            zone_id: plan.zone.provider_zone_id.clone(),
            steps: Vec::with_capacity(plan.operations.len()),
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }

    pub(crate) fn push(&mut self, index: usize, op: &Operation, status: ApplyStatus) {
        match &status {
            ApplyStatus::Applied | ApplyStatus::AlreadyAbsent | ApplyStatus::AlreadyPresent => {
                self.succeeded += 1
            }
            ApplyStatus::Failed { .. } => self.failed += 1,
            ApplyStatus::Skipped { .. } => self.skipped += 1,
        }
        self.steps.push(ApplyStep {
            index,
            kind: op.kind,
            key: op.key(),
            step: op.describe(),
            status,
        });
    }

    /// No step failed or was skipped.
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mailzone_provider::RecordData;

    fn zone() -> Zone {
        Zone {
            domain: "example.com".into(),
            provider_zone_id: "z1".into(),
            fetched_at: Utc::now(),
        }
    }

    fn a(address: &str) -> DnsRecord {
        DnsRecord::new(
            "mail.example.com",
            300,
            RecordData::A {
                address: address.into(),
            },
        )
    }

    #[test]
    fn describes_updates_with_both_values() {
        let op = Operation::update(a("192.0.2.10").with_id("r1"), a("192.0.2.9").with_id("r1"));
        assert_eq!(
            op.describe(),
            "UPDATE A mail.example.com 192.0.2.9 -> 192.0.2.10 (ttl 300)"
        );
        assert_eq!(
            Operation::create(a("192.0.2.10")).describe(),
            "CREATE A mail.example.com 192.0.2.10 (ttl 300)"
        );
    }

    #[test]
    fn report_counts_statuses() {
        let mut plan = ReconciliationPlan::new("example.com", zone());
        plan.operations = vec![
            Operation::create(a("192.0.2.1")),
            Operation::delete(a("192.0.2.2").with_id("r2")),
            Operation::create(a("192.0.2.3")),
        ];
        let mut report = ApplyReport::new(&plan);
        report.push(0, &plan.operations[0], ApplyStatus::Applied);
        report.push(1, &plan.operations[1], ApplyStatus::AlreadyAbsent);
        report.push(
            2,
            &plan.operations[2],
            ApplyStatus::Failed {
                error: "boom".into(),
                class: ErrorClass::Other,
            },
        );
        assert_eq!((report.succeeded, report.failed, report.skipped), (2, 1, 0));
        assert!(!report.is_complete());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["steps"][1]["status"], "alreadyAbsent");
        assert_eq!(json["steps"][2]["class"], "other");
        assert_eq!(json["zoneId"], "z1");
    }

    #[test]
    fn plan_ids_are_unique() {
        let a = ReconciliationPlan::new("example.com", zone());
        let b = ReconciliationPlan::new("example.com", zone());
        assert_ne!(a.id, b.id);
        assert!(a.is_empty());
    }
}
