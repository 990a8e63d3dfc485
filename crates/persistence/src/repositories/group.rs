//! Group repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::{Group, GroupMembership};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::entities::{GroupEntity, GroupPrivacyDb, GROUP_COLUMNS};
use crate::metrics::QueryTimer;
use crate::repositories::membership::insert_membership;

/// Repository for group-related database operations.
#[derive(Clone)]
pub struct GroupRepository {
    pool: PgPool,
}

impl GroupRepository {
    /// Creates a new GroupRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a new group and add the creator's admin membership.
    pub async fn create_group(
        &self,
        group: &Group,
        creator: &GroupMembership,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("create_group");

        // Both rows or neither
        let mut tx = self.pool.begin().await?;
        insert_group(&mut tx, group).await?;
        insert_membership(&mut *tx, creator).await?;
        tx.commit().await?;

        timer.record();
        Ok(())
    }

    /// Find a group by ID.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<GroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_group_by_id");
        let result = sqlx::query_as::<_, GroupEntity>(&format!(
            "SELECT {} FROM groups WHERE id = $1",
            GROUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.observe(result)
    }

    /// Find a group by title within an organization, ignoring case.
    pub async fn find_by_title(
        &self,
        org_id: &str,
        title: &str,
    ) -> Result<Option<GroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_group_by_title");
        let result = sqlx::query_as::<_, GroupEntity>(&format!(
            "SELECT {} FROM groups WHERE org_id = $1 AND lower(title) = lower(btrim($2))",
            GROUP_COLUMNS
        ))
        .bind(org_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await;
        timer.observe(result)
    }

    /// List groups of an organization, optionally filtered by title substring and category.
    pub async fn list(
        &self,
        org_id: &str,
        title: Option<&str>,
        category: Option<&str>,
    ) -> Result<Vec<GroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_groups");
        let result = sqlx::query_as::<_, GroupEntity>(&format!(
            r#"
            SELECT {}
            FROM groups
            WHERE org_id = $1
              AND ($2::text IS NULL OR title ILIKE '%' || $2 || '%')
              AND ($3::text IS NULL OR category = $3)
            ORDER BY lower(title)
            "#,
            GROUP_COLUMNS
        ))
        .bind(org_id)
        .bind(title)
        .bind(category)
        .fetch_all(&self.pool)
        .await;
        timer.observe(result)
    }

    /// List groups synchronized from the directory.
    pub async fn list_managed(&self, org_id: Option<&str>) -> Result<Vec<GroupEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_managed_groups");
        let result = sqlx::query_as::<_, GroupEntity>(&format!(
            r#"
            SELECT {}
            FROM groups
            WHERE authman_enabled = true
              AND btrim(coalesce(authman_group, '')) <> ''
              AND ($1::text IS NULL OR org_id = $1)
            ORDER BY date_created
            "#,
            GROUP_COLUMNS
        ))
        .bind(org_id)
        .fetch_all(&self.pool)
        .await;
        timer.observe(result)
    }

    /// Update the editable columns of a group. Sync bookkeeping columns are left untouched.
    pub async fn update(&self, group: &Group) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("update_group");
        let result = sqlx::query(
            r#"
            UPDATE groups SET
                title = $2, description = $3, category = $4, tags = $5, image_url = $6,
                privacy = $7, hidden_for_search = $8, can_join_automatically = $9,
                membership_questions = $10, authman_enabled = $11, authman_group = $12,
                settings = $13, only_admins_can_create_polls = $14, attendance_group = $15,
                research_group = $16, research_open = $17, date_updated = $18
            WHERE id = $1
            "#,
        )
        .bind(group.id)
        .bind(&group.title)
        .bind(&group.description)
        .bind(&group.category)
        .bind(&group.tags)
        .bind(&group.image_url)
        .bind(GroupPrivacyDb::from(group.privacy))
        .bind(group.hidden_for_search)
        .bind(group.can_join_automatically)
        .bind(&group.membership_questions)
        .bind(group.authman_enabled)
        .bind(&group.authman_group)
        .bind(group.settings.map(Json))
        .bind(group.only_admins_can_create_polls)
        .bind(group.attendance_group)
        .bind(group.research_group)
        .bind(group.research_open)
        .bind(group.date_updated)
        .execute(&self.pool)
        .await;
        Ok(timer.observe(result)?.rows_affected())
    }

    /// Delete a group. Memberships go with it via ON DELETE CASCADE.
    pub async fn delete(&self, id: Uuid) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_group");
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;
        Ok(timer.observe(result)?.rows_affected())
    }

    /// Conditionally take the sync lease.
    ///
    /// The row is only updated when no lease is held or the held one started
    /// before `stale_before`, so two concurrent callers cannot both succeed.
    pub async fn begin_sync(
        &self,
        group_id: Uuid,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<i64>, sqlx::Error> {
        let timer = QueryTimer::new("begin_group_sync");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE groups
            SET last_sync_id = last_sync_id + 1, sync_started_at = $2
            WHERE id = $1 AND (sync_started_at IS NULL OR sync_started_at < $3)
            RETURNING last_sync_id
            "#,
        )
        .bind(group_id)
        .bind(now)
        .bind(stale_before)
        .fetch_optional(&self.pool)
        .await;
        timer.observe(result)
    }

    /// Release the lease held by `sync_id`.
    pub async fn finish_sync(
        &self,
        group_id: Uuid,
        sync_id: i64,
        synced_at: Option<DateTime<Utc>>,
    ) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("finish_group_sync");
        let result = sqlx::query(
            r#"
            UPDATE groups
            SET sync_started_at = NULL, last_synced_at = COALESCE($3, last_synced_at)
            WHERE id = $1 AND last_sync_id = $2
            "#,
        )
        .bind(group_id)
        .bind(sync_id)
        .bind(synced_at)
        .execute(&self.pool)
        .await;
        timer.observe(result).map(|_| ())
    }

    /// Lightweight connectivity check.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }
}

async fn insert_group(tx: &mut Transaction<'_, Postgres>, group: &Group) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO groups (
            id, org_id, app_id, title, description, category, tags, image_url, privacy,
            hidden_for_search, can_join_automatically, membership_questions, authman_enabled,
            authman_group, settings, only_admins_can_create_polls, attendance_group,
            research_group, research_open, last_sync_id, date_created, date_updated
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
        "#,
    )
    .bind(group.id)
    .bind(&group.org_id)
    .bind(&group.app_id)
    .bind(&group.title)
    .bind(&group.description)
    .bind(&group.category)
    .bind(&group.tags)
    .bind(&group.image_url)
    .bind(GroupPrivacyDb::from(group.privacy))
    .bind(group.hidden_for_search)
    .bind(group.can_join_automatically)
    .bind(&group.membership_questions)
    .bind(group.authman_enabled)
    .bind(&group.authman_group)
    .bind(group.settings.map(Json))
    .bind(group.only_admins_can_create_polls)
    .bind(group.attendance_group)
    .bind(group.research_group)
    .bind(group.research_open)
    .bind(group.last_sync_id)
    .bind(group.date_created)
    .bind(group.date_updated)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
