//! 记录同步服务
//!
//! 将模板渲染出的期望记录集与 Zone 的现有记录比较，生成有序的写操作计划并执行。
//!
//! The template owns every `(type, name)` pair it declares. Live records outside
//! those pairs are never touched. Inside an owned pair:
//!
//! - keys on both sides become an `Update` when TTL, priority or proxy setting differ;
//! - with `prune` on, stale and fresh keys are paired in sorted order into in-place
//!   updates, leftovers become deletes and creates;
//! - with `prune` off, fresh keys are created and stale keys are left alone.
//!
//! A pair is *exclusive* when its type is CNAME or the template declares a single value
//! for it. Its deletes run first and the group's other writes depend on them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use mailzone_provider::{DnsRecord, DnsRecordType, ErrorClass, RecordKey};

use crate::error::{CoreError, CoreResult};
use crate::services::record_store::{CreateOutcome, DeleteOutcome, RecordStore};
use crate::services::zone_locks::ZoneLocks;
use crate::services::zone_resolver::ZoneResolver;
use crate::types::{
    ApplyReport, ApplyStatus, Operation, OperationKind, ReconciliationPlan, Template,
};

/// Default TTL for template records that do not set one.
pub const DEFAULT_RECORD_TTL: u32 = 300;

type GroupKey = (DnsRecordType, String);

#[derive(Default)]
struct Group<'a> {
    desired: Vec<&'a DnsRecord>,
    live: Vec<&'a DnsRecord>,
}

/// Operations of the plan before global ordering.
#[derive(Default)]
struct Buckets {
    exclusive_deletes: Vec<(GroupKey, Operation)>,
    updates: Vec<(Option<GroupKey>, Operation)>,
    creates: Vec<(Option<GroupKey>, Operation)>,
    other_deletes: Vec<Operation>,
}

/// 期望属性与现有记录不同（`proxied: None` 表示不关心）
///
/// Proxied records carry the provider's automatic TTL, so their TTL is not compared.
fn attributes_differ(desired: &DnsRecord, live: &DnsRecord) -> bool {
    let proxied = desired.proxied.or(live.proxied) == Some(true);
    (!proxied && desired.ttl != live.ttl)
        || desired.data.priority() != live.data.priority()
        || desired.proxied.is_some_and(|p| live.proxied != Some(p))
}

/// Desired record addressed to a live record's id.
fn retarget(desired: &DnsRecord, live: &DnsRecord) -> DnsRecord {
    let mut record = desired.clone();
    record.id.clone_from(&live.id);
    record
}

/// Computes the ordered operations turning `live` into `desired` and the warnings found on the way.
pub fn plan_operations(
    desired: &[DnsRecord],
    live: &[DnsRecord],
    prune: bool,
) -> (Vec<Operation>, Vec<String>) {
    let mut groups: BTreeMap<GroupKey, Group<'_>> = BTreeMap::new();
    for record in desired {
        groups
            .entry((record.record_type(), record.name.clone()))
            .or_default()
            .desired
            .push(record);
    }
    let mut unowned_by_name: HashMap<&str, Vec<DnsRecordType>> = HashMap::new();
    for record in live {
        match groups.get_mut(&(record.record_type(), record.name.clone())) {
            Some(group) => group.live.push(record),
            None => unowned_by_name
                .entry(record.name.as_str())
                .or_default()
                .push(record.record_type()),
        }
    }

    let mut warnings = Vec::new();
    let mut buckets = Buckets::default();

    for (group_key, group) in &groups {
        let (record_type, name) = group_key;
        if *record_type == DnsRecordType::Cname {
            if let Some(types) = unowned_by_name.get(name.as_str()) {
                let mut types: Vec<String> = types.iter().map(ToString::to_string).collect();
                types.sort();
                types.dedup();
                warnings.push(format!(
                    "CNAME at {name} conflicts with unmanaged live records ({})",
                    types.join(", ")
                ));
            }
        }
        diff_group(group_key, group, prune, &mut buckets, &mut warnings);
    }

    (order(buckets), warnings)
}

fn diff_group(
    group_key: &GroupKey,
    group: &Group<'_>,
    prune: bool,
    buckets: &mut Buckets,
    warnings: &mut Vec<String>,
) {
    let exclusive = group_key.0 == DnsRecordType::Cname || group.desired.len() == 1;

    let desired: BTreeMap<RecordKey, &DnsRecord> =
        group.desired.iter().map(|r| (r.key(), *r)).collect();
    let mut live: BTreeMap<RecordKey, Vec<&DnsRecord>> = BTreeMap::new();
    for record in &group.live {
        live.entry(record.key()).or_default().push(record);
    }

    let mut deletes = Vec::new();
    let mut dependents = Vec::new();
    let mut stale = Vec::new();
    let mut fresh = Vec::new();

    for (key, records) in &live {
        let Some(wanted) = desired.get(key) else {
            stale.extend(records.iter().copied());
            continue;
        };
        let Some((kept, duplicates)) = records.split_first() else {
            continue;
        };
        if !duplicates.is_empty() {
            if prune {
                warnings.push(format!(
                    "{} live duplicates of {key} will be deleted",
                    duplicates.len()
                ));
                deletes.extend(duplicates.iter().map(|r| Operation::delete((*r).clone())));
            } else {
                warnings.push(format!(
                    "{} live duplicates of {key} left in place (prune is off)",
                    duplicates.len()
                ));
            }
        }
        if attributes_differ(wanted, kept) {
            buckets
                .updates
                .push((None, Operation::update(retarget(wanted, kept), (*kept).clone())));
        }
    }
    for (key, record) in &desired {
        if !live.contains_key(key) {
            fresh.push(*record);
        }
    }

    if prune {
        let pairs = stale.len().min(fresh.len());
        for (old, new) in stale.iter().zip(fresh.iter()) {
            dependents.push((
                OperationKind::Update,
                Operation::update(retarget(new, old), (*old).clone()),
            ));
        }
        deletes.extend(stale[pairs..].iter().map(|r| Operation::delete((*r).clone())));
        dependents.extend(
            fresh[pairs..]
                .iter()
                .map(|r| (OperationKind::Create, Operation::create((*r).clone()))),
        );
    } else {
        if exclusive && !stale.is_empty() {
            warnings.push(format!(
                "{} {} keeps {} conflicting live records (prune is off)",
                group_key.0,
                group_key.1,
                stale.len()
            ));
        }
        dependents.extend(
            fresh
                .iter()
                .map(|r| (OperationKind::Create, Operation::create((*r).clone()))),
        );
    }

    let tag = (exclusive && !deletes.is_empty()).then(|| group_key.clone());
    if exclusive {
        buckets
            .exclusive_deletes
            .extend(deletes.into_iter().map(|op| (group_key.clone(), op)));
    } else {
        buckets.other_deletes.extend(deletes);
    }
    for (kind, op) in dependents {
        match kind {
            OperationKind::Create => buckets.creates.push((tag.clone(), op)),
            _ => buckets.updates.push((tag.clone(), op)),
        }
    }
}

/// Exclusive deletes, updates, creates, other deletes.
fn order(buckets: Buckets) -> Vec<Operation> {
    let mut operations = Vec::new();
    let mut last_delete: HashMap<GroupKey, usize> = HashMap::new();

    for (group, op) in buckets.exclusive_deletes {
        last_delete.insert(group, operations.len());
        operations.push(op);
    }
    for (group, mut op) in buckets.updates.into_iter().chain(buckets.creates) {
        op.depends_on = group.and_then(|g| last_delete.get(&g).copied());
        operations.push(op);
    }
    operations.extend(buckets.other_deletes);
    operations
}

fn failure(error: &CoreError) -> ApplyStatus {
    let class = match error {
        CoreError::Provider(e) => e.class(),
        CoreError::Validation(_) => ErrorClass::Validation,
        _ => ErrorClass::Other,
    };
    ApplyStatus::Failed {
        error: error.to_string(),
        class,
    }
}

/// Plans and applies template changes.
pub struct Reconciler {
    zones: Arc<ZoneResolver>,
    records: Arc<RecordStore>,
    locks: Arc<ZoneLocks>,
    default_ttl: u32,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        zones: Arc<ZoneResolver>,
        records: Arc<RecordStore>,
        locks: Arc<ZoneLocks>,
        default_ttl: u32,
    ) -> Self {
        Self {
            zones,
            records,
            locks,
            default_ttl,
        }
    }

    /// Diffs the rendered template against the zone's live records.
    pub async fn reconcile(&self, template: &Template) -> CoreResult<ReconciliationPlan> {
        let desired = template.render(self.default_ttl)?;
        let domain = template.canonical_domain();
        let zone = self.zones.resolve_zone(&domain, false).await?;
        let live = self.records.list(&zone.provider_zone_id).await?;

        let (operations, warnings) = plan_operations(&desired, &live, template.prune);
        for warning in &warnings {
            log::warn!("[reconciler] zone={} {warning}", zone.domain);
        }

        let mut plan = ReconciliationPlan::new(domain, zone);
        plan.operations = operations;
        plan.warnings = warnings;
        log::info!(
            "[reconciler] zone={} plan {}: {} create, {} update, {} delete",
            plan.zone.domain,
            plan.id,
            plan.count(OperationKind::Create),
            plan.count(OperationKind::Update),
            plan.count(OperationKind::Delete)
        );
        Ok(plan)
    }

    /// Runs the plan one operation at a time under the zone's write lock.
    ///
    /// Failures do not stop independent operations; operations depending on a failed
    /// one are skipped. Returns [`CoreError::PartialFailure`] when any operation failed.
    pub async fn apply(&self, plan: &ReconciliationPlan) -> CoreResult<ApplyReport> {
        let zone_id = plan.zone.provider_zone_id.as_str();
        let _guard = self.locks.lock(zone_id).await;

        let mut report = ApplyReport::new(plan);
        for (index, op) in plan.operations.iter().enumerate() {
            let status = match op.depends_on {
                Some(dep) if !report.steps.get(dep).is_some_and(|s| s.status.is_success()) => {
                    ApplyStatus::Skipped {
                        reason: format!("operation #{dep} did not succeed"),
                    }
                }
                _ => self.run(zone_id, op).await,
            };

            match &status {
                ApplyStatus::Failed { error, .. } => log::warn!(
                    "[reconciler] zone={zone_id} #{index} {} failed: {error}",
                    op.describe()
                ),
                ApplyStatus::Skipped { reason } => log::warn!(
                    "[reconciler] zone={zone_id} #{index} {} skipped: {reason}",
                    op.describe()
                ),
                _ => log::info!("[reconciler] zone={zone_id} #{index} {}", op.describe()),
            }
            report.push(index, op, status);
        }

        if report.failed > 0 {
            return Err(CoreError::PartialFailure(report));
        }
        Ok(report)
    }

    async fn run(&self, zone_id: &str, op: &Operation) -> ApplyStatus {
        let record = &op.record;
        let result = match (op.kind, live_id(op)) {
            (OperationKind::Create, _) => self
                .records
                .create(zone_id, record)
                .await
                .map(|outcome| match outcome {
                    CreateOutcome::Created(_) => ApplyStatus::Applied,
                    CreateOutcome::AlreadyPresent(_) => ApplyStatus::AlreadyPresent,
                }),
            (OperationKind::Update, Some(id)) => self
                .records
                .update(zone_id, id, record)
                .await
                .map(|_| ApplyStatus::Applied),
            (OperationKind::Delete, Some(id)) => {
                self.records
                    .delete(zone_id, id)
                    .await
                    .map(|outcome| match outcome {
                        DeleteOutcome::Deleted => ApplyStatus::Applied,
                        DeleteOutcome::AlreadyAbsent => ApplyStatus::AlreadyAbsent,
                    })
            }
            (kind, None) => Err(CoreError::Validation(format!(
                "{kind} of {} has no record id",
                record.name
            ))),
        };
        result.unwrap_or_else(|e| failure(&e))
    }
}

fn live_id(op: &Operation) -> Option<&str> {
    op.record
        .id
        .as_deref()
        .or_else(|| op.previous.as_ref().and_then(|p| p.id.as_deref()))
}
