//! Directory roster reconciliation for managed groups.
//!
//! A pass claims the group's sync lease, reads the local memberships and the
//! external roster, computes a plan, then applies it record by record. Both
//! reads finish before the first write. A roster failure aborts the pass with
//! nothing written; a failed record write is collected in the report and the
//! rest of the batch continues.

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::collaborators::{AccountDirectory, RosterSource, SubjectDetails};
use crate::error::{StoreError, SyncError};
use crate::models::{EffectiveRole, Group, GroupMembership, MemberIdentity};
use crate::store::{GroupStore, MembershipFilter};

/// Reconciliation settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Only roster subjects reported with this source type are accepted.
    pub subject_source: String,
    /// External identifiers created with the admin role.
    pub admin_external_ids: HashSet<String>,
    /// Upper bound for one group's pass.
    pub time_budget: std::time::Duration,
    /// Age after which an unreleased sync lease may be taken over.
    pub lease: Duration,
    /// Scheduled runs skip groups synced more recently than this.
    pub min_resync: Duration,
    /// Groups reconciled in parallel by a scheduled run.
    pub workers: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            subject_source: "uin".to_string(),
            admin_external_ids: HashSet::new(),
            time_budget: std::time::Duration::from_secs(120),
            lease: Duration::minutes(10),
            min_resync: Duration::minutes(30),
            workers: 4,
        }
    }
}

/// Which write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Stamp,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub operation: SyncOperation,
    /// Unset for the bulk stamp.
    pub external_id: Option<String>,
    pub error: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub group_id: Uuid,
    pub sync_id: i64,
    /// External identifiers added.
    pub created: Vec<String>,
    /// External identifiers promoted to member.
    pub updated: Vec<String>,
    /// External identifiers removed.
    pub removed: Vec<String>,
    pub stamped: u64,
    /// Roster entries ignored (other source type, blank, or already present by account).
    pub skipped_subjects: usize,
    pub failures: Vec<SyncFailure>,
    /// The time budget ran out before every write was issued.
    pub timed_out: bool,
}

impl SyncReport {
    fn new(group_id: Uuid, sync_id: i64) -> Self {
        Self {
            group_id,
            sync_id,
            created: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
            stamped: 0,
            skipped_subjects: 0,
            failures: Vec::new(),
            timed_out: false,
        }
    }

    /// No failures and not cut short.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.timed_out
    }

    fn fail(&mut self, operation: SyncOperation, external_id: Option<&str>, error: StoreError) {
        warn!(
            group_id = %self.group_id,
            sync_id = self.sync_id,
            ?operation,
            external_id = external_id.unwrap_or(""),
            error = %error,
            "Reconciliation write failed"
        );
        self.failures.push(SyncFailure {
            operation,
            external_id: external_id.map(str::to_string),
            error: error.to_string(),
        });
    }
}

/// Changes needed to converge local memberships to the roster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    /// Roster identifiers with no local membership, in roster order.
    pub to_create: Vec<String>,
    /// Matched memberships still pending or rejected.
    pub to_promote: Vec<GroupMembership>,
    /// Every matched membership id.
    pub matched: Vec<Uuid>,
    /// Non-admin memberships whose external identifier left the roster.
    pub to_remove: Vec<GroupMembership>,
}

impl ReconciliationPlan {
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_promote.is_empty() && self.to_remove.is_empty()
    }
}

/// Diffs local memberships against roster identifiers.
///
/// Memberships without an external identifier are never touched, and admins
/// are never removed.
pub fn plan_reconciliation(local: &[GroupMembership], roster: &[String]) -> ReconciliationPlan {
    let by_external: HashMap<&str, &GroupMembership> = local
        .iter()
        .filter_map(|m| m.external_key().map(|id| (id, m)))
        .collect();

    let mut plan = ReconciliationPlan::default();
    let mut seen: HashSet<&str> = HashSet::new();
    for id in roster {
        let id = id.trim();
        if id.is_empty() || !seen.insert(id) {
            continue;
        }
        match by_external.get(id) {
            Some(existing) => {
                plan.matched.push(existing.id);
                if matches!(existing.role, EffectiveRole::Pending | EffectiveRole::Rejected) {
                    plan.to_promote.push((*existing).clone());
                }
            }
            None => plan.to_create.push(id.to_string()),
        }
    }

    for membership in local {
        let Some(id) = membership.external_key() else {
            continue;
        };
        if !seen.contains(id) && membership.role != EffectiveRole::Admin {
            plan.to_remove.push(membership.clone());
        }
    }
    plan
}

/// Result of reconciling every managed group.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub groups_considered: usize,
    /// Skipped because they were synced within the resync interval.
    pub groups_skipped: usize,
    pub outcomes: Vec<GroupSyncOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSyncOutcome {
    pub group_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Reconciles managed groups against the directory roster.
#[derive(Clone)]
pub struct AuthmanReconciler {
    store: Arc<dyn GroupStore>,
    roster: Arc<dyn RosterSource>,
    accounts: Arc<dyn AccountDirectory>,
    config: Arc<ReconcilerConfig>,
}

impl AuthmanReconciler {
    pub fn new(
        store: Arc<dyn GroupStore>,
        roster: Arc<dyn RosterSource>,
        accounts: Arc<dyn AccountDirectory>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            roster,
            accounts,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Runs one pass for `group_id`.
    ///
    /// Returns `Busy` if another pass holds the group's lease.
    pub async fn reconcile_group(&self, group_id: Uuid) -> Result<SyncReport, SyncError> {
        let group = self
            .store
            .find_group(group_id)
            .await?
            .ok_or(SyncError::GroupNotFound)?;
        let stem = group.managed_stem().ok_or(SyncError::NotManaged)?.to_string();

        let Some(sync_id) = self
            .store
            .begin_sync(group.id, self.config.lease, Utc::now())
            .await?
        else {
            counter!("authman_sync_passes_total", "outcome" => "busy").increment(1);
            return Err(SyncError::Busy);
        };

        debug!(group_id = %group.id, sync_id, stem = %stem, "Reconciliation pass started");
        let result = self.run_pass(&group, &stem, sync_id).await;

        let synced_at = result.as_ref().ok().map(|_| Utc::now());
        if let Err(e) = self.store.finish_sync(group.id, sync_id, synced_at).await {
            warn!(group_id = %group.id, sync_id, error = %e, "Failed to release sync lease");
        }

        match &result {
            Ok(report) => {
                let outcome = if report.timed_out {
                    "timeout"
                } else if report.failures.is_empty() {
                    "ok"
                } else {
                    "partial"
                };
                counter!("authman_sync_passes_total", "outcome" => outcome).increment(1);
                counter!("authman_sync_memberships_total", "op" => "created")
                    .increment(report.created.len() as u64);
                counter!("authman_sync_memberships_total", "op" => "updated")
                    .increment(report.updated.len() as u64);
                counter!("authman_sync_memberships_total", "op" => "removed")
                    .increment(report.removed.len() as u64);
                info!(
                    group_id = %group.id,
                    sync_id,
                    created = report.created.len(),
                    updated = report.updated.len(),
                    removed = report.removed.len(),
                    stamped = report.stamped,
                    skipped = report.skipped_subjects,
                    failures = report.failures.len(),
                    timed_out = report.timed_out,
                    "Reconciliation pass finished"
                );
            }
            Err(e) => {
                let outcome = if matches!(e, SyncError::Timeout) { "timeout" } else { "error" };
                counter!("authman_sync_passes_total", "outcome" => outcome).increment(1);
                warn!(group_id = %group.id, sync_id, error = %e, "Reconciliation pass aborted");
            }
        }
        result
    }

    async fn run_pass(
        &self,
        group: &Group,
        stem: &str,
        sync_id: i64,
    ) -> Result<SyncReport, SyncError> {
        let deadline = Instant::now() + self.config.time_budget;
        let mut report = SyncReport::new(group.id, sync_id);

        let all = MembershipFilter::default();
        let reads = async {
            tokio::try_join!(
                async {
                    self.store
                        .list_memberships(group.id, &all)
                        .await
                        .map_err(SyncError::from)
                },
                async {
                    self.roster
                        .fetch_group_members(stem)
                        .await
                        .map_err(SyncError::from)
                },
            )
        };
        let (local, subjects) = timeout_at(deadline, reads)
            .await
            .map_err(|_| SyncError::Timeout)??;

        let mut roster = Vec::with_capacity(subjects.len());
        for subject in subjects {
            if subject.source_id == self.config.subject_source && !subject.id.trim().is_empty() {
                roster.push(subject.id);
            } else {
                report.skipped_subjects += 1;
            }
        }

        let plan = plan_reconciliation(&local, &roster);
        if plan.is_noop() && plan.matched.is_empty() {
            return Ok(report);
        }

        let details = if plan.to_create.is_empty() {
            HashMap::new()
        } else {
            match timeout_at(deadline, self.roster.fetch_subject_details(&plan.to_create)).await {
                Err(_) => return Err(SyncError::Timeout),
                Ok(Ok(details)) => details,
                Ok(Err(e)) => {
                    warn!(group_id = %group.id, error = %e, "Subject details unavailable");
                    HashMap::new()
                }
            }
        };

        let bound_users: HashSet<&str> = local.iter().filter_map(|m| m.user_id.as_deref()).collect();

        for external_id in &plan.to_create {
            if Instant::now() >= deadline {
                report.timed_out = true;
                return Ok(report);
            }
            let account = self.resolve_account(group, external_id, deadline).await;
            if Instant::now() >= deadline {
                report.timed_out = true;
                return Ok(report);
            }
            if let Some(user_id) = account.as_ref().and_then(|a| a.user_id.as_deref()) {
                if bound_users.contains(user_id) {
                    debug!(
                        group_id = %group.id,
                        external_id = %external_id,
                        "Account already holds a membership; skipping"
                    );
                    report.skipped_subjects += 1;
                    continue;
                }
            }

            let role = if self.config.admin_external_ids.contains(external_id) {
                EffectiveRole::Admin
            } else {
                EffectiveRole::Member
            };
            let now = Utc::now();
            let mut membership = GroupMembership::new(&group.org_id, group.id, role, now);
            membership.external_id = Some(external_id.clone());
            membership.sync_id = Some(sync_id);
            if let Some(identity) = &account {
                membership.apply_identity_if_empty(identity);
            }
            if let Some(fallback) = details.get(external_id) {
                membership.apply_identity_if_empty(&identity_from_details(fallback));
            }

            match timeout_at(deadline, self.store.create_membership(&membership)).await {
                Err(_) => {
                    report.timed_out = true;
                    return Ok(report);
                }
                Ok(Ok(())) => report.created.push(external_id.clone()),
                Ok(Err(e)) => report.fail(SyncOperation::Create, Some(external_id), e),
            }
        }

        let promoted: HashSet<Uuid> = plan.to_promote.iter().map(|m| m.id).collect();
        for mut membership in plan.to_promote {
            if Instant::now() >= deadline {
                report.timed_out = true;
                return Ok(report);
            }
            let external_id = membership.external_key().map(str::to_string);
            membership.set_role_unchecked(EffectiveRole::Member, None, Utc::now());
            membership.sync_id = Some(sync_id);
            match timeout_at(deadline, self.store.update_membership(&membership)).await {
                Err(_) => {
                    report.timed_out = true;
                    return Ok(report);
                }
                Ok(Ok(())) => report.updated.extend(external_id),
                Ok(Err(e)) => report.fail(SyncOperation::Update, external_id.as_deref(), e),
            }
        }

        let to_stamp: Vec<Uuid> = plan
            .matched
            .iter()
            .copied()
            .filter(|id| !promoted.contains(id))
            .collect();
        if !to_stamp.is_empty() {
            if Instant::now() >= deadline {
                report.timed_out = true;
                return Ok(report);
            }
            let stamp = self
                .store
                .stamp_sync_id(group.id, &to_stamp, sync_id, Utc::now());
            match timeout_at(deadline, stamp).await {
                Err(_) => {
                    report.timed_out = true;
                    return Ok(report);
                }
                Ok(Ok(count)) => report.stamped = count,
                Ok(Err(e)) => report.fail(SyncOperation::Stamp, None, e),
            }
        }

        for membership in plan.to_remove {
            if Instant::now() >= deadline {
                report.timed_out = true;
                return Ok(report);
            }
            let external_id = membership.external_key().map(str::to_string);
            match timeout_at(deadline, self.store.delete_membership(membership.id)).await {
                Err(_) => {
                    report.timed_out = true;
                    return Ok(report);
                }
                Ok(Ok(())) => report.removed.extend(external_id),
                // Already gone, e.g. the member left while the pass was running.
                Ok(Err(StoreError::NotFound)) => {}
                Ok(Err(e)) => report.fail(SyncOperation::Remove, external_id.as_deref(), e),
            }
        }

        Ok(report)
    }

    /// Best-effort account lookup. Failures are logged and treated as "no account".
    async fn resolve_account(
        &self,
        group: &Group,
        external_id: &str,
        deadline: Instant,
    ) -> Option<MemberIdentity> {
        match timeout_at(
            deadline,
            self.accounts.resolve_by_external_id(&group.org_id, external_id),
        )
        .await
        {
            Ok(Ok(Some(account))) => Some(MemberIdentity::from(&account)),
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(
                    group_id = %group.id,
                    external_id = %external_id,
                    error = %e,
                    "Account lookup failed"
                );
                None
            }
            Err(_) => None,
        }
    }

    /// Reconciles every managed group, `workers` at a time.
    ///
    /// Unless `force` is set, groups synced within `min_resync` are skipped.
    pub async fn reconcile_all(
        &self,
        org_id: Option<&str>,
        force: bool,
    ) -> Result<SyncSummary, SyncError> {
        let groups = self.store.list_managed_groups(org_id).await?;
        let now = Utc::now();
        let mut summary = SyncSummary {
            groups_considered: groups.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks = JoinSet::new();
        for group in groups {
            if !force && synced_recently(&group, now, self.config.min_resync) {
                summary.groups_skipped += 1;
                continue;
            }
            let reconciler = self.clone();
            let semaphore = semaphore.clone();
            let group_id = group.id;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                // The pass runs in its own task so a panic is reported against its group.
                let pass = tokio::spawn(async move { reconciler.reconcile_group(group_id).await });
                (group_id, pass.await)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok((group_id, Ok(Ok(report)))) => GroupSyncOutcome {
                    group_id,
                    report: Some(report),
                    error: None,
                },
                Ok((group_id, Ok(Err(e)))) => GroupSyncOutcome {
                    group_id,
                    report: None,
                    error: Some(e.to_string()),
                },
                Ok((group_id, Err(e))) => {
                    warn!(group_id = %group_id, error = %e, "Reconciliation task panicked");
                    counter!("authman_sync_passes_total", "outcome" => "panic").increment(1);
                    GroupSyncOutcome {
                        group_id,
                        report: None,
                        error: Some(format!("reconciliation task failed: {}", e)),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Reconciliation worker failed");
                    continue;
                }
            };
            summary.outcomes.push(outcome);
        }
        summary.outcomes.sort_by_key(|o| o.group_id);
        Ok(summary)
    }
}

fn synced_recently(group: &Group, now: DateTime<Utc>, min_resync: Duration) -> bool {
    group
        .last_synced_at
        .is_some_and(|at| now - at < min_resync)
}

fn identity_from_details(details: &SubjectDetails) -> MemberIdentity {
    MemberIdentity {
        name: details.name.clone(),
        email: details.email.clone(),
        ..Default::default()
    }
}
