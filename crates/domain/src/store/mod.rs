//! The storage trait the domain services depend on.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{EffectiveRole, Group, GroupMembership, GroupStats};

/// Filter for group listings. All groups are scoped by organization.
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    pub org_id: String,
    /// Case-insensitive substring match on the title.
    pub title: Option<String>,
    pub category: Option<String>,
}

/// Filter for membership listings. Empty `roles` means every role.
#[derive(Debug, Clone, Default)]
pub struct MembershipFilter {
    pub roles: Vec<EffectiveRole>,
}

impl MembershipFilter {
    pub fn roles(roles: &[EffectiveRole]) -> Self {
        Self {
            roles: roles.to_vec(),
        }
    }

    pub fn matches(&self, membership: &GroupMembership) -> bool {
        self.roles.is_empty() || self.roles.contains(&membership.role)
    }
}

/// Persistence for groups and memberships.
///
/// Memberships are unique per (`group_id`, `user_id`) and per (`group_id`,
/// `external_id`) when those are set; group titles are unique per organization
/// ignoring case. Violations surface as [`StoreError::Conflict`].
#[async_trait]
pub trait GroupStore: Send + Sync {
    // ───────────────────────────────────── Groups ─────────────────────────────────────────

    /// Inserts a group together with its creator's admin membership.
    async fn create_group(
        &self,
        group: &Group,
        creator: &GroupMembership,
    ) -> Result<(), StoreError>;

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError>;

    /// Case-insensitive title lookup within an organization.
    async fn find_group_by_title(
        &self,
        org_id: &str,
        title: &str,
    ) -> Result<Option<Group>, StoreError>;

    async fn list_groups(&self, filter: &GroupFilter) -> Result<Vec<Group>, StoreError>;

    /// Groups with the directory sync flag set and a stem configured.
    async fn list_managed_groups(&self, org_id: Option<&str>) -> Result<Vec<Group>, StoreError>;

    async fn update_group(&self, group: &Group) -> Result<(), StoreError>;

    /// Deletes a group and all of its memberships.
    async fn delete_group(&self, group_id: Uuid) -> Result<(), StoreError>;

    // ───────────────────────────────────── Sync lease ─────────────────────────────────────

    /// Claims the reconciliation lease for a group.
    ///
    /// Succeeds only if no lease is held or the held lease is older than `lease`.
    /// On success `last_sync_id` is incremented and the new value returned.
    async fn begin_sync(
        &self,
        group_id: Uuid,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError>;

    /// Releases the lease taken with `sync_id`, recording `synced_at` as
    /// `last_synced_at` when given. A no-op if another pass has since taken the lease.
    async fn finish_sync(
        &self,
        group_id: Uuid,
        sync_id: i64,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Memberships ────────────────────────────────────

    async fn find_membership(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<GroupMembership>, StoreError>;

    async fn find_user_membership(
        &self,
        group_id: Uuid,
        user_id: &str,
    ) -> Result<Option<GroupMembership>, StoreError>;

    async fn list_memberships(
        &self,
        group_id: Uuid,
        filter: &MembershipFilter,
    ) -> Result<Vec<GroupMembership>, StoreError>;

    /// Memberships in an organization held by `user_id`, or by `external_id`
    /// when the record is not yet bound to an account.
    async fn list_user_memberships(
        &self,
        org_id: &str,
        user_id: &str,
        external_id: Option<&str>,
    ) -> Result<Vec<GroupMembership>, StoreError>;

    async fn create_membership(&self, membership: &GroupMembership) -> Result<(), StoreError>;

    /// Overwrites a membership. Returns `NotFound` if it no longer exists.
    async fn update_membership(&self, membership: &GroupMembership) -> Result<(), StoreError>;

    async fn delete_membership(&self, membership_id: Uuid) -> Result<(), StoreError>;

    /// Stamps `sync_id` on the given memberships in one write. Returns the number updated.
    async fn stamp_sync_id(
        &self,
        group_id: Uuid,
        membership_ids: &[Uuid],
        sync_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn group_stats(&self, group_id: Uuid) -> Result<GroupStats, StoreError> {
        let memberships = self
            .list_memberships(group_id, &MembershipFilter::default())
            .await?;
        Ok(GroupStats::from_memberships(&memberships))
    }

    /// Connectivity check used by readiness probes.
    async fn ping(&self) -> Result<(), StoreError>;
}
