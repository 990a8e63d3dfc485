//! In-memory [`GroupStore`] used by tests and local development.
//!
//! A single lock guards both collections so multi-record operations
//! (create group + admin membership, delete cascade, sync lease) are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{GroupFilter, GroupStore, MembershipFilter};
use crate::error::StoreError;
use crate::models::{Group, GroupMembership};

#[derive(Default)]
struct Inner {
    groups: HashMap<Uuid, Group>,
    memberships: HashMap<Uuid, GroupMembership>,
    failing_external_ids: HashSet<String>,
    write_delay: Option<std::time::Duration>,
}

impl Inner {
    fn title_taken(&self, org_id: &str, title: &str, except: Option<Uuid>) -> bool {
        let needle = title.to_lowercase();
        self.groups.values().any(|g| {
            g.org_id == org_id && g.title.to_lowercase() == needle && Some(g.id) != except
        })
    }

    fn check_membership_unique(&self, membership: &GroupMembership) -> Result<(), StoreError> {
        for existing in self.memberships.values() {
            if existing.id == membership.id || existing.group_id != membership.group_id {
                continue;
            }
            if let (Some(a), Some(b)) = (&existing.user_id, &membership.user_id) {
                if a == b {
                    return Err(StoreError::Conflict(
                        "Membership already exists for this user".to_string(),
                    ));
                }
            }
            if let (Some(a), Some(b)) = (existing.external_key(), membership.external_key()) {
                if a == b {
                    return Err(StoreError::Conflict(
                        "Membership already exists for this external identifier".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_write_allowed(&self, membership: &GroupMembership) -> Result<(), StoreError> {
        match membership.external_key() {
            Some(id) if self.failing_external_ids.contains(id) => Err(StoreError::Database(
                format!("simulated write failure for {}", id),
            )),
            _ => Ok(()),
        }
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every membership write for `external_id` fail with a database error.
    pub async fn fail_writes_for_external_id(&self, external_id: &str) {
        self.inner
            .write()
            .await
            .failing_external_ids
            .insert(external_id.to_string());
    }

    /// Delays every membership write, simulating a stalled database.
    pub async fn set_write_delay(&self, delay: Option<std::time::Duration>) {
        self.inner.write().await.write_delay = delay;
    }

    async fn stall_write(&self) {
        let delay = self.inner.read().await.write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Inserts a group without a creator membership (fixtures).
    pub async fn insert_group(&self, group: Group) {
        self.inner.write().await.groups.insert(group.id, group);
    }

    /// Inserts a membership bypassing uniqueness checks (fixtures).
    pub async fn insert_membership(&self, membership: GroupMembership) {
        self.inner
            .write()
            .await
            .memberships
            .insert(membership.id, membership);
    }

    pub async fn membership_count(&self, group_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .memberships
            .values()
            .filter(|m| m.group_id == group_id)
            .count()
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn create_group(
        &self,
        group: &Group,
        creator: &GroupMembership,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.title_taken(&group.org_id, &group.title, None) {
            return Err(StoreError::Conflict(
                "A group with this title already exists".to_string(),
            ));
        }
        inner.groups.insert(group.id, group.clone());
        inner.memberships.insert(creator.id, creator.clone());
        Ok(())
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        Ok(self.inner.read().await.groups.get(&group_id).cloned())
    }

    async fn find_group_by_title(
        &self,
        org_id: &str,
        title: &str,
    ) -> Result<Option<Group>, StoreError> {
        let needle = title.trim().to_lowercase();
        Ok(self
            .inner
            .read()
            .await
            .groups
            .values()
            .find(|g| g.org_id == org_id && g.title.to_lowercase() == needle)
            .cloned())
    }

    async fn list_groups(&self, filter: &GroupFilter) -> Result<Vec<Group>, StoreError> {
        let title = filter.title.as_deref().map(str::to_lowercase);
        let inner = self.inner.read().await;
        let mut groups: Vec<Group> = inner
            .groups
            .values()
            .filter(|g| g.org_id == filter.org_id)
            .filter(|g| match &title {
                Some(t) => g.title.to_lowercase().contains(t.as_str()),
                None => true,
            })
            .filter(|g| match &filter.category {
                Some(c) => g.category.as_deref() == Some(c.as_str()),
                None => true,
            })
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        Ok(groups)
    }

    async fn list_managed_groups(&self, org_id: Option<&str>) -> Result<Vec<Group>, StoreError> {
        let inner = self.inner.read().await;
        let mut groups: Vec<Group> = inner
            .groups
            .values()
            .filter(|g| g.is_managed())
            .filter(|g| org_id.map_or(true, |org| g.org_id == org))
            .cloned()
            .collect();
        groups.sort_by_key(|g| g.date_created);
        Ok(groups)
    }

    async fn update_group(&self, group: &Group) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.title_taken(&group.org_id, &group.title, Some(group.id)) {
            return Err(StoreError::Conflict(
                "A group with this title already exists".to_string(),
            ));
        }
        let stored = inner.groups.get_mut(&group.id).ok_or(StoreError::NotFound)?;
        // Sync bookkeeping is owned by begin_sync/finish_sync.
        let mut updated = group.clone();
        updated.last_sync_id = stored.last_sync_id;
        updated.sync_started_at = stored.sync_started_at;
        updated.last_synced_at = stored.last_synced_at;
        *stored = updated;
        Ok(())
    }

    async fn delete_group(&self, group_id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.groups.remove(&group_id).is_none() {
            return Err(StoreError::NotFound);
        }
        inner.memberships.retain(|_, m| m.group_id != group_id);
        Ok(())
    }

    async fn begin_sync(
        &self,
        group_id: Uuid,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        let mut inner = self.inner.write().await;
        let group = inner.groups.get_mut(&group_id).ok_or(StoreError::NotFound)?;
        if let Some(started) = group.sync_started_at {
            if now - started < lease {
                return Ok(None);
            }
        }
        group.last_sync_id += 1;
        group.sync_started_at = Some(now);
        Ok(Some(group.last_sync_id))
    }

    async fn finish_sync(
        &self,
        group_id: Uuid,
        sync_id: i64,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let group = inner.groups.get_mut(&group_id).ok_or(StoreError::NotFound)?;
        if group.last_sync_id == sync_id {
            group.sync_started_at = None;
            if synced_at.is_some() {
                group.last_synced_at = synced_at;
            }
        }
        Ok(())
    }

    async fn find_membership(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<GroupMembership>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .memberships
            .get(&membership_id)
            .cloned())
    }

    async fn find_user_membership(
        &self,
        group_id: Uuid,
        user_id: &str,
    ) -> Result<Option<GroupMembership>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .memberships
            .values()
            .find(|m| m.group_id == group_id && m.belongs_to_user(user_id))
            .cloned())
    }

    async fn list_memberships(
        &self,
        group_id: Uuid,
        filter: &MembershipFilter,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let inner = self.inner.read().await;
        let mut memberships: Vec<GroupMembership> = inner
            .memberships
            .values()
            .filter(|m| m.group_id == group_id && filter.matches(m))
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.date_created);
        Ok(memberships)
    }

    async fn list_user_memberships(
        &self,
        org_id: &str,
        user_id: &str,
        external_id: Option<&str>,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let inner = self.inner.read().await;
        let mut memberships: Vec<GroupMembership> = inner
            .memberships
            .values()
            .filter(|m| m.org_id == org_id)
            .filter(|m| {
                m.belongs_to_user(user_id)
                    || (m.user_id.is_none()
                        && external_id.is_some()
                        && m.external_key() == external_id)
            })
            .cloned()
            .collect();
        memberships.sort_by_key(|m| m.date_created);
        Ok(memberships)
    }

    async fn create_membership(&self, membership: &GroupMembership) -> Result<(), StoreError> {
        self.stall_write().await;
        let mut inner = self.inner.write().await;
        inner.check_write_allowed(membership)?;
        if !inner.groups.contains_key(&membership.group_id) {
            return Err(StoreError::NotFound);
        }
        inner.check_membership_unique(membership)?;
        inner.memberships.insert(membership.id, membership.clone());
        Ok(())
    }

    async fn update_membership(&self, membership: &GroupMembership) -> Result<(), StoreError> {
        self.stall_write().await;
        let mut inner = self.inner.write().await;
        inner.check_write_allowed(membership)?;
        if !inner.memberships.contains_key(&membership.id) {
            return Err(StoreError::NotFound);
        }
        inner.check_membership_unique(membership)?;
        inner.memberships.insert(membership.id, membership.clone());
        Ok(())
    }

    async fn delete_membership(&self, membership_id: Uuid) -> Result<(), StoreError> {
        self.stall_write().await;
        let mut inner = self.inner.write().await;
        match inner.memberships.get(&membership_id) {
            None => Err(StoreError::NotFound),
            Some(existing) => {
                inner.check_write_allowed(existing)?;
                inner.memberships.remove(&membership_id);
                Ok(())
            }
        }
    }

    async fn stamp_sync_id(
        &self,
        group_id: Uuid,
        membership_ids: &[Uuid],
        sync_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.stall_write().await;
        let mut inner = self.inner.write().await;
        let mut updated = 0;
        for id in membership_ids {
            if let Some(m) = inner.memberships.get_mut(id) {
                if m.group_id == group_id {
                    m.sync_id = Some(sync_id);
                    m.date_updated = now;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
