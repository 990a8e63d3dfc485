//! Group membership domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use super::account::MemberIdentity;

/// Membership status as persisted, before the admin flag is folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Member,
    Rejected,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Pending => "pending",
            MembershipStatus::Member => "member",
            MembershipStatus::Rejected => "rejected",
        }
    }
}

/// The single resolved role of a membership.
///
/// Storage keeps a `status` column and an `admin` flag; they are folded into
/// this enum once, when a record is read, so the two can never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectiveRole {
    Pending,
    Member,
    Admin,
    Rejected,
}

impl EffectiveRole {
    /// Folds the stored `(status, admin)` pair into a role. `admin` wins.
    pub fn from_stored(status: MembershipStatus, admin: bool) -> Self {
        if admin {
            return EffectiveRole::Admin;
        }
        match status {
            MembershipStatus::Pending => EffectiveRole::Pending,
            MembershipStatus::Member => EffectiveRole::Member,
            MembershipStatus::Rejected => EffectiveRole::Rejected,
        }
    }

    /// Splits the role back into the stored `(status, admin)` pair.
    pub fn to_stored(self) -> (MembershipStatus, bool) {
        match self {
            EffectiveRole::Pending => (MembershipStatus::Pending, false),
            EffectiveRole::Member => (MembershipStatus::Member, false),
            EffectiveRole::Admin => (MembershipStatus::Member, true),
            EffectiveRole::Rejected => (MembershipStatus::Rejected, false),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectiveRole::Pending => "pending",
            EffectiveRole::Member => "member",
            EffectiveRole::Admin => "admin",
            EffectiveRole::Rejected => "rejected",
        }
    }

    /// Member or admin.
    pub fn is_active_member(&self) -> bool {
        matches!(self, EffectiveRole::Member | EffectiveRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, EffectiveRole::Admin)
    }

    /// Returns true if an administrative action may move a membership from `self` to `next`.
    ///
    /// Legal: pending→member, pending→rejected, member→rejected, any→admin, admin→member.
    pub fn can_transition_to(&self, next: EffectiveRole) -> bool {
        use EffectiveRole::*;
        if *self == next {
            return true;
        }
        matches!(
            (*self, next),
            (Pending, Member) | (Pending, Rejected) | (Member, Rejected) | (_, Admin) | (Admin, Member)
        )
    }
}

impl FromStr for EffectiveRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(EffectiveRole::Pending),
            "member" => Ok(EffectiveRole::Member),
            "admin" => Ok(EffectiveRole::Admin),
            "rejected" => Ok(EffectiveRole::Rejected),
            _ => Err(format!("Invalid membership status: {}", s)),
        }
    }
}

impl fmt::Display for EffectiveRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned for an illegal role change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot change membership from {from} to {to}")]
pub struct RoleTransitionError {
    pub from: EffectiveRole,
    pub to: EffectiveRole,
}

/// Notification categories a member can mute per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Invitations,
    Posts,
    Events,
    Polls,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Invitations => "invitations",
            NotificationCategory::Posts => "posts",
            NotificationCategory::Events => "events",
            NotificationCategory::Polls => "polls",
        }
    }
}

/// Per-membership override of the account's global notification settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct NotificationsPreferences {
    /// When false the mute flags below are ignored.
    pub override_preferences: bool,
    pub all_mute: bool,
    pub invitations_mute: bool,
    pub posts_mute: bool,
    pub events_mute: bool,
    pub polls_mute: bool,
}

impl NotificationsPreferences {
    /// `override_preferences && (all_mute || category_mute)`.
    pub fn is_muted(&self, category: NotificationCategory) -> bool {
        if !self.override_preferences {
            return false;
        }
        let category_mute = match category {
            NotificationCategory::Invitations => self.invitations_mute,
            NotificationCategory::Posts => self.posts_mute,
            NotificationCategory::Events => self.events_mute,
            NotificationCategory::Polls => self.polls_mute,
        };
        self.all_mute || category_mute
    }
}

/// A question/answer pair collected when a user asks to join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct MemberAnswer {
    #[validate(length(min = 1, max = 500, message = "Question must be between 1 and 500 characters"))]
    pub question: String,
    #[validate(length(max = 2000, message = "Answer must be at most 2000 characters"))]
    pub answer: String,
}

/// A user's (or external identity's) membership in a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupMembership {
    pub id: Uuid,
    pub org_id: String,
    pub group_id: Uuid,
    /// Unset for directory-synced records whose account could not be resolved yet.
    pub user_id: Option<String>,
    pub external_id: Option<String>,
    pub net_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub photo_url: Option<String>,
    #[serde(rename = "status")]
    pub role: EffectiveRole,
    pub reject_reason: Option<String>,
    pub member_answers: Vec<MemberAnswer>,
    pub sync_id: Option<i64>,
    pub notifications_preferences: NotificationsPreferences,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub date_attended: Option<DateTime<Utc>>,
}

impl GroupMembership {
    /// Creates a fresh membership with no identity fields filled in.
    pub fn new(org_id: &str, group_id: Uuid, role: EffectiveRole, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            group_id,
            user_id: None,
            external_id: None,
            net_id: None,
            email: None,
            name: None,
            photo_url: None,
            role,
            reject_reason: None,
            member_answers: Vec::new(),
            sync_id: None,
            notifications_preferences: NotificationsPreferences::default(),
            date_created: now,
            date_updated: now,
            date_attended: None,
        }
    }

    /// Builder-style identity fill used when creating records.
    pub fn with_identity(mut self, identity: &MemberIdentity) -> Self {
        self.apply_identity_if_empty(identity);
        self
    }

    /// Copies identity values into fields that are currently empty; never
    /// overwrites a populated field. Returns true if anything changed.
    pub fn apply_identity_if_empty(&mut self, identity: &MemberIdentity) -> bool {
        let mut changed = false;
        changed |= fill_if_empty(&mut self.user_id, &identity.user_id);
        changed |= fill_if_empty(&mut self.external_id, &identity.external_id);
        changed |= fill_if_empty(&mut self.net_id, &identity.net_id);
        changed |= fill_if_empty(&mut self.name, &identity.name);
        changed |= fill_if_empty(&mut self.email, &identity.email);
        changed |= fill_if_empty(&mut self.photo_url, &identity.photo_url);
        changed
    }

    /// Applies an administrative role change.
    ///
    /// `reject_reason` is kept only while the role is `Rejected`.
    pub fn change_role(
        &mut self,
        next: EffectiveRole,
        reject_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), RoleTransitionError> {
        if !self.role.can_transition_to(next) {
            return Err(RoleTransitionError {
                from: self.role,
                to: next,
            });
        }
        self.set_role_unchecked(next, reject_reason, now);
        Ok(())
    }

    /// Sets the role without transition checks (join re-requests, directory sync).
    pub fn set_role_unchecked(
        &mut self,
        next: EffectiveRole,
        reject_reason: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.role = next;
        self.reject_reason = if next == EffectiveRole::Rejected {
            reject_reason.filter(|r| !r.trim().is_empty())
        } else {
            None
        };
        self.date_updated = now;
    }

    /// External identifier if present and non-blank.
    pub fn external_key(&self) -> Option<&str> {
        self.external_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    pub fn belongs_to_user(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }
}

fn fill_if_empty(field: &mut Option<String>, value: &Option<String>) -> bool {
    let is_empty = field.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true);
    match value {
        Some(v) if is_empty && !v.trim().is_empty() => {
            *field = Some(v.clone());
            true
        }
        _ => false,
    }
}

/// Per-group membership counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupStats {
    pub total_count: i64,
    pub admins_count: i64,
    pub member_count: i64,
    pub pending_count: i64,
    pub rejected_count: i64,
    pub attendance_count: i64,
}

impl GroupStats {
    /// Computes stats from a full membership list.
    pub fn from_memberships(memberships: &[GroupMembership]) -> Self {
        let mut stats = GroupStats::default();
        for m in memberships {
            stats.total_count += 1;
            match m.role {
                EffectiveRole::Admin => stats.admins_count += 1,
                EffectiveRole::Member => stats.member_count += 1,
                EffectiveRole::Pending => stats.pending_count += 1,
                EffectiveRole::Rejected => stats.rejected_count += 1,
            }
            if m.date_attended.is_some() {
                stats.attendance_count += 1;
            }
        }
        stats
    }
}

// ============================================================================
// Request DTOs
// ============================================================================

/// Request payload for joining a group.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct JoinGroupRequest {
    #[serde(default)]
    #[validate(nested)]
    pub member_answers: Vec<MemberAnswer>,
}

/// Request payload for an admin adding a member directly.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct AddMemberRequest {
    #[validate(length(min = 1, max = 128, message = "User ID must be between 1 and 128 characters"))]
    pub user_id: Option<String>,
    #[validate(length(min = 1, max = 64, message = "External ID must be between 1 and 64 characters"))]
    pub external_id: Option<String>,
    #[validate(length(max = 200, message = "Name must be at most 200 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub net_id: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

/// Request payload for an admin changing a member's role.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UpdateMembershipRequest {
    pub status: EffectiveRole,
    pub reject_reason: Option<String>,
}

/// Request payload for approving or rejecting a pending membership.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct MembershipDecisionRequest {
    pub approve: bool,
    #[validate(length(max = 1000, message = "Reject reason must be at most 1000 characters"))]
    pub reject_reason: Option<String>,
}

/// Query parameters for listing members.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListMembersQuery {
    /// Comma separated statuses, e.g. `member,admin`.
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListMembersQuery {
    /// Parses the status filter. An empty filter means "all".
    pub fn statuses(&self) -> Result<Vec<EffectiveRole>, String> {
        match &self.status {
            None => Ok(Vec::new()),
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(EffectiveRole::from_str)
                .collect(),
        }
    }
}
