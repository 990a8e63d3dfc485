//! PostgreSQL implementation of the domain store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use domain::models::{Group, GroupMembership};
use domain::store::{GroupFilter, GroupStore, MembershipFilter};
use domain::StoreError;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::repositories::{GroupRepository, MembershipRepository};

/// PostgreSQL error code for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Maps sqlx errors onto the store's error vocabulary.
pub fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            let message = match db_err.constraint() {
                Some("groups_org_title_key") => "A group with this title already exists",
                Some("group_memberships_group_user_key") => {
                    "Membership already exists for this user"
                }
                Some("group_memberships_group_external_key") => {
                    "Membership already exists for this external identifier"
                }
                _ => "Resource already exists",
            };
            StoreError::Conflict(message.to_string())
        }
        other => {
            error!(error = %other, "Database error");
            StoreError::Database(other.to_string())
        }
    }
}

fn expect_row(rows_affected: u64) -> Result<(), StoreError> {
    if rows_affected == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

/// [`GroupStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgGroupStore {
    groups: GroupRepository,
    memberships: MembershipRepository,
}

impl PgGroupStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            groups: GroupRepository::new(pool.clone()),
            memberships: MembershipRepository::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        self.groups.pool()
    }
}

#[async_trait]
impl GroupStore for PgGroupStore {
    async fn create_group(
        &self,
        group: &Group,
        creator: &GroupMembership,
    ) -> Result<(), StoreError> {
        self.groups
            .create_group(group, creator)
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_group(&self, group_id: Uuid) -> Result<Option<Group>, StoreError> {
        let entity = self
            .groups
            .find_by_id(group_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(entity.map(Into::into))
    }

    async fn find_group_by_title(
        &self,
        org_id: &str,
        title: &str,
    ) -> Result<Option<Group>, StoreError> {
        let entity = self
            .groups
            .find_by_title(org_id, title)
            .await
            .map_err(map_sqlx_error)?;
        Ok(entity.map(Into::into))
    }

    async fn list_groups(&self, filter: &GroupFilter) -> Result<Vec<Group>, StoreError> {
        let entities = self
            .groups
            .list(
                &filter.org_id,
                filter.title.as_deref().map(str::trim),
                filter.category.as_deref(),
            )
            .await
            .map_err(map_sqlx_error)?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn list_managed_groups(&self, org_id: Option<&str>) -> Result<Vec<Group>, StoreError> {
        let entities = self
            .groups
            .list_managed(org_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn update_group(&self, group: &Group) -> Result<(), StoreError> {
        let rows = self.groups.update(group).await.map_err(map_sqlx_error)?;
        expect_row(rows)
    }

    async fn delete_group(&self, group_id: Uuid) -> Result<(), StoreError> {
        let rows = self.groups.delete(group_id).await.map_err(map_sqlx_error)?;
        expect_row(rows)
    }

    async fn begin_sync(
        &self,
        group_id: Uuid,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        self.groups
            .begin_sync(group_id, now, now - lease)
            .await
            .map_err(map_sqlx_error)
    }

    async fn finish_sync(
        &self,
        group_id: Uuid,
        sync_id: i64,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.groups
            .finish_sync(group_id, sync_id, synced_at)
            .await
            .map_err(map_sqlx_error)
    }

    async fn find_membership(
        &self,
        membership_id: Uuid,
    ) -> Result<Option<GroupMembership>, StoreError> {
        let entity = self
            .memberships
            .find_by_id(membership_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(entity.map(Into::into))
    }

    async fn find_user_membership(
        &self,
        group_id: Uuid,
        user_id: &str,
    ) -> Result<Option<GroupMembership>, StoreError> {
        let entity = self
            .memberships
            .find_by_user(group_id, user_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(entity.map(Into::into))
    }

    async fn list_memberships(
        &self,
        group_id: Uuid,
        filter: &MembershipFilter,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let entities = self
            .memberships
            .list_by_group(group_id, &filter.roles)
            .await
            .map_err(map_sqlx_error)?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn list_user_memberships(
        &self,
        org_id: &str,
        user_id: &str,
        external_id: Option<&str>,
    ) -> Result<Vec<GroupMembership>, StoreError> {
        let external_id = external_id.map(str::trim).filter(|id| !id.is_empty());
        let entities = self
            .memberships
            .list_for_user(org_id, user_id, external_id)
            .await
            .map_err(map_sqlx_error)?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn create_membership(&self, membership: &GroupMembership) -> Result<(), StoreError> {
        self.memberships
            .create(membership)
            .await
            .map_err(map_sqlx_error)
    }

    async fn update_membership(&self, membership: &GroupMembership) -> Result<(), StoreError> {
        let rows = self
            .memberships
            .update(membership)
            .await
            .map_err(map_sqlx_error)?;
        expect_row(rows)
    }

    async fn delete_membership(&self, membership_id: Uuid) -> Result<(), StoreError> {
        let rows = self
            .memberships
            .delete(membership_id)
            .await
            .map_err(map_sqlx_error)?;
        expect_row(rows)
    }

    async fn stamp_sync_id(
        &self,
        group_id: Uuid,
        membership_ids: &[Uuid],
        sync_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.memberships
            .stamp_sync_id(group_id, membership_ids, sync_id, now)
            .await
            .map_err(map_sqlx_error)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.groups.ping().await.map_err(map_sqlx_error)
    }
}
