//! Group domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::membership::{EffectiveRole, GroupMembership, GroupStats};

/// Group visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupPrivacy {
    #[default]
    Public,
    Private,
}

impl GroupPrivacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupPrivacy::Public => "public",
            GroupPrivacy::Private => "private",
        }
    }
}

impl FromStr for GroupPrivacy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(GroupPrivacy::Public),
            "private" => Ok(GroupPrivacy::Private),
            _ => Err(format!("Invalid group privacy: {}", s)),
        }
    }
}

impl fmt::Display for GroupPrivacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which member fields non-admin viewers may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct MemberInfoPreferences {
    pub can_view_member_name: bool,
    pub can_view_member_net_id: bool,
    pub can_view_member_email: bool,
    pub can_view_member_phone: bool,
}

impl Default for MemberInfoPreferences {
    fn default() -> Self {
        Self {
            can_view_member_name: true,
            can_view_member_net_id: true,
            can_view_member_email: true,
            can_view_member_phone: true,
        }
    }
}

/// What non-admin members may do with posts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct PostPreferences {
    pub allow_send_post: bool,
    pub can_send_post_to_specific_members: bool,
    pub can_send_post_to_admins: bool,
    pub can_send_post_replies: bool,
    pub can_send_post_reactions: bool,
}

impl Default for PostPreferences {
    fn default() -> Self {
        Self {
            allow_send_post: true,
            can_send_post_to_specific_members: true,
            can_send_post_to_admins: true,
            can_send_post_replies: true,
            can_send_post_reactions: true,
        }
    }
}

/// Per-group settings. The defaults permit everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct GroupSettings {
    pub member_info_preferences: MemberInfoPreferences,
    pub post_preferences: PostPreferences,
}

/// A group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Group {
    pub id: Uuid,
    pub org_id: String,
    pub app_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub privacy: GroupPrivacy,
    pub hidden_for_search: bool,
    pub can_join_automatically: bool,
    pub membership_questions: Vec<String>,
    pub authman_enabled: bool,
    pub authman_group: Option<String>,
    pub settings: Option<GroupSettings>,
    pub only_admins_can_create_polls: bool,
    pub attendance_group: bool,
    pub research_group: bool,
    pub research_open: bool,
    /// Id of the most recent reconciliation pass. Monotonically increasing.
    pub last_sync_id: i64,
    /// Set while a reconciliation pass holds the lease.
    pub sync_started_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

impl Group {
    /// Returns the directory stem if this group's roster is managed externally.
    pub fn managed_stem(&self) -> Option<&str> {
        if !self.authman_enabled {
            return None;
        }
        self.authman_group
            .as_deref()
            .map(str::trim)
            .filter(|stem| !stem.is_empty())
    }

    pub fn is_managed(&self) -> bool {
        self.managed_stem().is_some()
    }

    /// Explicit settings, or the permissive defaults.
    pub fn effective_settings(&self) -> GroupSettings {
        self.settings.unwrap_or_default()
    }

    /// Public and not hidden from search.
    pub fn is_openly_visible(&self) -> bool {
        self.privacy == GroupPrivacy::Public && !self.hidden_for_search
    }

    /// Builds a new group from a create request.
    pub fn from_request(org_id: &str, app_id: &str, request: CreateGroupRequest, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            app_id: app_id.to_string(),
            title: request.title.trim().to_string(),
            description: request.description,
            category: request.category,
            tags: request.tags,
            image_url: request.image_url,
            privacy: request.privacy,
            hidden_for_search: request.hidden_for_search,
            can_join_automatically: request.can_join_automatically,
            membership_questions: request.membership_questions,
            authman_enabled: request.authman_enabled,
            authman_group: request.authman_group,
            settings: request.settings,
            only_admins_can_create_polls: request.only_admins_can_create_polls,
            attendance_group: request.attendance_group,
            research_group: request.research_group,
            research_open: request.research_open,
            last_sync_id: 0,
            sync_started_at: None,
            last_synced_at: None,
            date_created: now,
            date_updated: now,
        }
    }

    /// Applies the fields present in an update request.
    pub fn apply_update(&mut self, request: UpdateGroupRequest, now: DateTime<Utc>) {
        if let Some(title) = request.title {
            self.title = title.trim().to_string();
        }
        if let Some(description) = request.description {
            self.description = Some(description);
        }
        if let Some(category) = request.category {
            self.category = Some(category);
        }
        if let Some(tags) = request.tags {
            self.tags = tags;
        }
        if let Some(image_url) = request.image_url {
            self.image_url = Some(image_url);
        }
        if let Some(privacy) = request.privacy {
            self.privacy = privacy;
        }
        if let Some(hidden) = request.hidden_for_search {
            self.hidden_for_search = hidden;
        }
        if let Some(auto) = request.can_join_automatically {
            self.can_join_automatically = auto;
        }
        if let Some(questions) = request.membership_questions {
            self.membership_questions = questions;
        }
        if let Some(enabled) = request.authman_enabled {
            self.authman_enabled = enabled;
        }
        if let Some(stem) = request.authman_group {
            self.authman_group = Some(stem);
        }
        if let Some(settings) = request.settings {
            self.settings = Some(settings);
        }
        if let Some(only_admins) = request.only_admins_can_create_polls {
            self.only_admins_can_create_polls = only_admins;
        }
        if let Some(attendance) = request.attendance_group {
            self.attendance_group = attendance;
        }
        if let Some(research) = request.research_group {
            self.research_group = research;
        }
        if let Some(open) = request.research_open {
            self.research_open = open;
        }
        self.date_updated = now;
    }
}

/// Request payload for creating a group.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    #[validate(custom(function = "shared::validation::validate_display_text"))]
    pub title: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 100, message = "Category must be at most 100 characters"))]
    pub category: Option<String>,

    #[serde(default)]
    #[validate(custom(function = "shared::validation::validate_tags"))]
    pub tags: Vec<String>,

    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,

    #[serde(default)]
    pub privacy: GroupPrivacy,

    #[serde(default)]
    pub hidden_for_search: bool,

    #[serde(default)]
    pub can_join_automatically: bool,

    #[serde(default)]
    #[validate(custom(function = "shared::validation::validate_questions"))]
    pub membership_questions: Vec<String>,

    #[serde(default)]
    pub authman_enabled: bool,

    #[validate(length(min = 1, max = 500, message = "Authman group must be between 1 and 500 characters"))]
    pub authman_group: Option<String>,

    pub settings: Option<GroupSettings>,

    #[serde(default)]
    pub only_admins_can_create_polls: bool,

    #[serde(default)]
    pub attendance_group: bool,

    #[serde(default)]
    pub research_group: bool,

    #[serde(default)]
    pub research_open: bool,
}

/// Request payload for updating a group. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct UpdateGroupRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    #[validate(custom(function = "shared::validation::validate_display_text"))]
    pub title: Option<String>,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    #[validate(length(max = 100, message = "Category must be at most 100 characters"))]
    pub category: Option<String>,

    #[validate(custom(function = "shared::validation::validate_tags"))]
    pub tags: Option<Vec<String>>,

    #[validate(url(message = "Image URL must be a valid URL"))]
    pub image_url: Option<String>,

    pub privacy: Option<GroupPrivacy>,
    pub hidden_for_search: Option<bool>,
    pub can_join_automatically: Option<bool>,

    #[validate(custom(function = "shared::validation::validate_questions"))]
    pub membership_questions: Option<Vec<String>>,

    pub authman_enabled: Option<bool>,

    #[validate(length(min = 1, max = 500, message = "Authman group must be between 1 and 500 characters"))]
    pub authman_group: Option<String>,

    pub settings: Option<GroupSettings>,
    pub only_admins_can_create_polls: Option<bool>,
    pub attendance_group: Option<bool>,
    pub research_group: Option<bool>,
    pub research_open: Option<bool>,
}

/// Query parameters for listing groups.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListGroupsQuery {
    /// Required for anonymous callers; authenticated callers use their own organization.
    pub org_id: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Public-facing group summary used in listings and join previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
    pub privacy: GroupPrivacy,
    pub can_join_automatically: bool,
    pub authman_enabled: bool,
    pub membership_questions: Vec<String>,
    /// The caller's role in the group, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_role: Option<EffectiveRole>,
}

impl GroupSummary {
    pub fn from_group(group: &Group, your_role: Option<EffectiveRole>) -> Self {
        Self {
            id: group.id,
            title: group.title.clone(),
            description: group.description.clone(),
            category: group.category.clone(),
            tags: group.tags.clone(),
            image_url: group.image_url.clone(),
            privacy: group.privacy,
            can_join_automatically: group.can_join_automatically,
            authman_enabled: group.authman_enabled,
            membership_questions: group.membership_questions.clone(),
            your_role,
        }
    }
}

/// How much of a group a caller may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewAccess {
    /// Everything, including member-only details.
    Full,
    /// Enough to submit a join request.
    JoinPreview,
    Denied,
}

/// Result of a group lookup, shaped by the caller's access.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupView {
    pub access: ViewAccess,
    pub group: GroupSummary,
    /// Full record, only with `Full` access.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Group>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_membership: Option<GroupMembership>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<GroupStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_permissions: Option<CallerPermissions>,
}

/// What the caller may do in a group, as decided by the authorization gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CallerPermissions {
    pub can_modify: bool,
    pub can_send_post: bool,
    pub can_send_post_to_specific_members: bool,
    pub can_send_post_to_admins: bool,
    pub can_reply: bool,
    pub can_react: bool,
    pub can_create_poll: bool,
}
