//! Group entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{GroupPrivacy, GroupSettings};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for group_privacy that maps to PostgreSQL enum type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "group_privacy", rename_all = "lowercase")]
pub enum GroupPrivacyDb {
    Public,
    Private,
}

impl From<GroupPrivacyDb> for GroupPrivacy {
    fn from(db_privacy: GroupPrivacyDb) -> Self {
        match db_privacy {
            GroupPrivacyDb::Public => GroupPrivacy::Public,
            GroupPrivacyDb::Private => GroupPrivacy::Private,
        }
    }
}

impl From<GroupPrivacy> for GroupPrivacyDb {
    fn from(privacy: GroupPrivacy) -> Self {
        match privacy {
            GroupPrivacy::Public => GroupPrivacyDb::Public,
            GroupPrivacy::Private => GroupPrivacyDb::Private,
        }
    }
}

/// Database row mapping for the groups table.
#[derive(Debug, Clone, FromRow)]
pub struct GroupEntity {
    pub id: Uuid,
    pub org_id: String,
    pub app_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub privacy: GroupPrivacyDb,
    pub hidden_for_search: bool,
    pub can_join_automatically: bool,
    pub membership_questions: Vec<String>,
    pub authman_enabled: bool,
    pub authman_group: Option<String>,
    pub settings: Option<Json<GroupSettings>>,
    pub only_admins_can_create_polls: bool,
    pub attendance_group: bool,
    pub research_group: bool,
    pub research_open: bool,
    pub last_sync_id: i64,
    pub sync_started_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// Column list shared by every group query.
pub const GROUP_COLUMNS: &str = "id, org_id, app_id, title, description, category, tags, image_url, \
     privacy, hidden_for_search, can_join_automatically, membership_questions, authman_enabled, \
     authman_group, settings, only_admins_can_create_polls, attendance_group, research_group, \
     research_open, last_sync_id, sync_started_at, last_synced_at, date_created, date_updated";

impl From<GroupEntity> for domain::models::Group {
    fn from(entity: GroupEntity) -> Self {
        Self {
            id: entity.id,
            org_id: entity.org_id,
            app_id: entity.app_id,
            title: entity.title,
            description: entity.description,
            category: entity.category,
            tags: entity.tags,
            image_url: entity.image_url,
            privacy: entity.privacy.into(),
            hidden_for_search: entity.hidden_for_search,
            can_join_automatically: entity.can_join_automatically,
            membership_questions: entity.membership_questions,
            authman_enabled: entity.authman_enabled,
            authman_group: entity.authman_group,
            settings: entity.settings.map(|Json(s)| s),
            only_admins_can_create_polls: entity.only_admins_can_create_polls,
            attendance_group: entity.attendance_group,
            research_group: entity.research_group,
            research_open: entity.research_open,
            last_sync_id: entity.last_sync_id,
            sync_started_at: entity.sync_started_at,
            last_synced_at: entity.last_synced_at,
            date_created: entity.date_created,
            date_updated: entity.date_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{Group, MemberInfoPreferences};

    fn entity() -> GroupEntity {
        let now = Utc::now();
        GroupEntity {
            id: Uuid::new_v4(),
            org_id: "org".into(),
            app_id: "app".into(),
            title: "Chess".into(),
            description: None,
            category: Some("Clubs".into()),
            tags: vec!["games".into()],
            image_url: None,
            privacy: GroupPrivacyDb::Private,
            hidden_for_search: false,
            can_join_automatically: true,
            membership_questions: vec![],
            authman_enabled: true,
            authman_group: Some("stem:chess".into()),
            settings: None,
            only_admins_can_create_polls: false,
            attendance_group: false,
            research_group: false,
            research_open: false,
            last_sync_id: 7,
            sync_started_at: None,
            last_synced_at: Some(now),
            date_created: now,
            date_updated: now,
        }
    }

    #[test]
    fn test_entity_to_domain() {
        let group: Group = entity().into();
        assert_eq!(group.privacy, GroupPrivacy::Private);
        assert_eq!(group.managed_stem(), Some("stem:chess"));
        assert_eq!(group.last_sync_id, 7);
        assert!(group.settings.is_none());
    }

    #[test]
    fn test_entity_settings_unwrapped() {
        let mut e = entity();
        let settings = GroupSettings {
            member_info_preferences: MemberInfoPreferences {
                can_view_member_email: false,
                ..Default::default()
            },
            ..Default::default()
        };
        e.settings = Some(Json(settings));
        let group: Group = e.into();
        assert_eq!(group.settings, Some(settings));
    }

    #[test]
    fn test_privacy_round_trip() {
        for privacy in [GroupPrivacy::Public, GroupPrivacy::Private] {
            assert_eq!(GroupPrivacy::from(GroupPrivacyDb::from(privacy)), privacy);
        }
    }
}
