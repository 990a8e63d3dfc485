//! Group membership entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{EffectiveRole, MemberAnswer, MembershipStatus, NotificationsPreferences};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for membership_status that maps to PostgreSQL enum type.
///
/// Admin is not a status; it is the separate `admin` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "membership_status", rename_all = "lowercase")]
pub enum MembershipStatusDb {
    Pending,
    Member,
    Rejected,
}

impl From<MembershipStatusDb> for MembershipStatus {
    fn from(db_status: MembershipStatusDb) -> Self {
        match db_status {
            MembershipStatusDb::Pending => MembershipStatus::Pending,
            MembershipStatusDb::Member => MembershipStatus::Member,
            MembershipStatusDb::Rejected => MembershipStatus::Rejected,
        }
    }
}

impl From<MembershipStatus> for MembershipStatusDb {
    fn from(status: MembershipStatus) -> Self {
        match status {
            MembershipStatus::Pending => MembershipStatusDb::Pending,
            MembershipStatus::Member => MembershipStatusDb::Member,
            MembershipStatus::Rejected => MembershipStatusDb::Rejected,
        }
    }
}

/// Database row mapping for the group_memberships table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupMembershipEntity {
    pub id: Uuid,
    pub org_id: String,
    pub group_id: Uuid,
    pub user_id: Option<String>,
    pub external_id: Option<String>,
    pub net_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    pub status: MembershipStatusDb,
    pub admin: bool,
    pub reject_reason: Option<String>,
    pub member_answers: Json<Vec<MemberAnswer>>,
    pub sync_id: Option<i64>,
    pub notifications_preferences: Json<NotificationsPreferences>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub date_attended: Option<DateTime<Utc>>,
}

pub const MEMBERSHIP_COLUMNS: &str = "id, org_id, group_id, user_id, external_id, net_id, email, \
     name, photo_url, status, admin, reject_reason, member_answers, sync_id, \
     notifications_preferences, date_created, date_updated, date_attended";

/// SQL expression resolving a row to its effective role name.
pub const EFFECTIVE_ROLE_SQL: &str = "CASE WHEN admin THEN 'admin' ELSE status::text END";

/// Splits a role into the `(status, admin)` column pair.
pub fn stored_role(role: EffectiveRole) -> (MembershipStatusDb, bool) {
    let (status, admin) = role.to_stored();
    (status.into(), admin)
}

impl From<GroupMembershipEntity> for domain::models::GroupMembership {
    fn from(entity: GroupMembershipEntity) -> Self {
        Self {
            id: entity.id,
            org_id: entity.org_id,
            group_id: entity.group_id,
            user_id: entity.user_id,
            external_id: entity.external_id,
            net_id: entity.net_id,
            email: entity.email,
            name: entity.name,
            photo_url: entity.photo_url,
            role: EffectiveRole::from_stored(entity.status.into(), entity.admin),
            reject_reason: entity.reject_reason,
            member_answers: entity.member_answers.0,
            sync_id: entity.sync_id,
            notifications_preferences: entity.notifications_preferences.0,
            date_created: entity.date_created,
            date_updated: entity.date_updated,
            date_attended: entity.date_attended,
        }
    }
}
