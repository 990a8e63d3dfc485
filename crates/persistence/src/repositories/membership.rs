//! Membership repository for database operations.

use chrono::{DateTime, Utc};
use domain::models::{EffectiveRole, GroupMembership};
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::entities::{stored_role, GroupMembershipEntity, EFFECTIVE_ROLE_SQL, MEMBERSHIP_COLUMNS};
use crate::metrics::QueryTimer;

/// Repository for membership-related database operations.
#[derive(Clone)]
pub struct MembershipRepository {
    pool: PgPool,
}

impl MembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<GroupMembershipEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_membership_by_id");
        let result = sqlx::query_as::<_, GroupMembershipEntity>(&format!(
            "SELECT {} FROM group_memberships WHERE id = $1",
            MEMBERSHIP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.observe(result)
    }

    pub async fn find_by_user(
        &self,
        group_id: Uuid,
        user_id: &str,
    ) -> Result<Option<GroupMembershipEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_membership_by_user");
        let result = sqlx::query_as::<_, GroupMembershipEntity>(&format!(
            "SELECT {} FROM group_memberships WHERE group_id = $1 AND user_id = $2",
            MEMBERSHIP_COLUMNS
        ))
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.observe(result)
    }

    /// List memberships of a group. An empty `roles` slice returns every role.
    pub async fn list_by_group(
        &self,
        group_id: Uuid,
        roles: &[EffectiveRole],
    ) -> Result<Vec<GroupMembershipEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_group_memberships");
        let role_names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
        let result = sqlx::query_as::<_, GroupMembershipEntity>(&format!(
            r#"
            SELECT {}
            FROM group_memberships
            WHERE group_id = $1
              AND (cardinality($2::text[]) = 0 OR {} = ANY($2))
            ORDER BY date_created
            "#,
            MEMBERSHIP_COLUMNS, EFFECTIVE_ROLE_SQL
        ))
        .bind(group_id)
        .bind(&role_names)
        .fetch_all(&self.pool)
        .await;
        timer.observe(result)
    }

    /// Memberships held by a user, plus unbound ones carrying the user's external identifier.
    pub async fn list_for_user(
        &self,
        org_id: &str,
        user_id: &str,
        external_id: Option<&str>,
    ) -> Result<Vec<GroupMembershipEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_user_memberships");
        let result = sqlx::query_as::<_, GroupMembershipEntity>(&format!(
            r#"
            SELECT {}
            FROM group_memberships
            WHERE org_id = $1
              AND (
                user_id = $2
                OR (user_id IS NULL AND $3::text IS NOT NULL AND btrim(external_id) = btrim($3))
              )
            ORDER BY date_created
            "#,
            MEMBERSHIP_COLUMNS
        ))
        .bind(org_id)
        .bind(user_id)
        .bind(external_id)
        .fetch_all(&self.pool)
        .await;
        timer.observe(result)
    }

    pub async fn create(&self, membership: &GroupMembership) -> Result<(), sqlx::Error> {
        let timer = QueryTimer::new("create_membership");
        let result = insert_membership(&self.pool, membership).await;
        timer.observe(result)
    }

    /// Overwrite a membership row. Returns the number of rows touched.
    pub async fn update(&self, membership: &GroupMembership) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("update_membership");
        let (status, admin) = stored_role(membership.role);
        let result = sqlx::query(
            r#"
            UPDATE group_memberships SET
                user_id = $2, external_id = $3, net_id = $4, email = $5, name = $6,
                photo_url = $7, status = $8, admin = $9, reject_reason = $10,
                member_answers = $11, sync_id = $12, notifications_preferences = $13,
                date_updated = $14, date_attended = $15
            WHERE id = $1
            "#,
        )
        .bind(membership.id)
        .bind(&membership.user_id)
        .bind(&membership.external_id)
        .bind(&membership.net_id)
        .bind(&membership.email)
        .bind(&membership.name)
        .bind(&membership.photo_url)
        .bind(status)
        .bind(admin)
        .bind(&membership.reject_reason)
        .bind(Json(&membership.member_answers))
        .bind(membership.sync_id)
        .bind(Json(membership.notifications_preferences))
        .bind(membership.date_updated)
        .bind(membership.date_attended)
        .execute(&self.pool)
        .await;
        Ok(timer.observe(result)?.rows_affected())
    }

    pub async fn delete(&self, id: Uuid) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_membership");
        let result = sqlx::query("DELETE FROM group_memberships WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;
        Ok(timer.observe(result)?.rows_affected())
    }

    /// Stamp a sync id on many memberships in a single statement.
    pub async fn stamp_sync_id(
        &self,
        group_id: Uuid,
        ids: &[Uuid],
        sync_id: i64,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }
        let timer = QueryTimer::new("stamp_membership_sync_id");
        let result = sqlx::query(
            r#"
            UPDATE group_memberships
            SET sync_id = $3, date_updated = $4
            WHERE group_id = $1 AND id = ANY($2)
            "#,
        )
        .bind(group_id)
        .bind(ids)
        .bind(sync_id)
        .bind(now)
        .execute(&self.pool)
        .await;
        Ok(timer.observe(result)?.rows_affected())
    }
}

/// Insert a membership row on any executor, so group creation can share its transaction.
pub(crate) async fn insert_membership<'e, E>(
    executor: E,
    membership: &GroupMembership,
) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let (status, admin) = stored_role(membership.role);
    sqlx::query(
        r#"
        INSERT INTO group_memberships (
            id, org_id, group_id, user_id, external_id, net_id, email, name, photo_url,
            status, admin, reject_reason, member_answers, sync_id, notifications_preferences,
            date_created, date_updated, date_attended
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        "#,
    )
    .bind(membership.id)
    .bind(&membership.org_id)
    .bind(membership.group_id)
    .bind(&membership.user_id)
    .bind(&membership.external_id)
    .bind(&membership.net_id)
    .bind(&membership.email)
    .bind(&membership.name)
    .bind(&membership.photo_url)
    .bind(status)
    .bind(admin)
    .bind(&membership.reject_reason)
    .bind(Json(&membership.member_answers))
    .bind(membership.sync_id)
    .bind(Json(membership.notifications_preferences))
    .bind(membership.date_created)
    .bind(membership.date_updated)
    .bind(membership.date_attended)
    .execute(executor)
    .await?;
    Ok(())
}
