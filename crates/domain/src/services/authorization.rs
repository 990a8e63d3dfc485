//! Authorization gate for group operations.
//!
//! Combines group privacy, the caller's membership and account-level
//! permission grants into allow/deny decisions. Every check is pure; the
//! caller loads the group and membership first.

use crate::error::GroupsError;
use crate::models::{
    Account, EffectiveRole, Group, GroupMembership, UpdateGroupRequest, ViewAccess,
};

pub const MANAGED_GROUP_ADMIN: &str = "managed_group_admin";
pub const RESEARCH_GROUP_ADMIN: &str = "research_group_admin";

/// Names of the account permission grants required for escalated operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationPolicy {
    pub managed_group_admin_permission: String,
    pub research_group_admin_permission: String,
}

impl Default for AuthorizationPolicy {
    fn default() -> Self {
        Self {
            managed_group_admin_permission: MANAGED_GROUP_ADMIN.to_string(),
            research_group_admin_permission: RESEARCH_GROUP_ADMIN.to_string(),
        }
    }
}

/// Post operations gated by `PostPreferences`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Send,
    SendToSpecificMembers,
    SendToAdmins,
    Reply,
    React,
}

#[derive(Debug, Clone, Default)]
pub struct AuthorizationGate {
    policy: AuthorizationPolicy,
}

impl AuthorizationGate {
    pub fn new(policy: AuthorizationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }

    /// Role the membership confers on `group`. A membership of another group confers nothing.
    fn role_in(group: &Group, membership: Option<&GroupMembership>) -> Option<EffectiveRole> {
        membership
            .filter(|m| m.group_id == group.id)
            .map(|m| m.role)
    }

    /// Full visibility: openly visible groups for everyone, otherwise members and admins.
    pub fn can_view(&self, group: &Group, membership: Option<&GroupMembership>) -> bool {
        if group.is_openly_visible() {
            return true;
        }
        Self::role_in(group, membership).is_some_and(|r| r.is_active_member())
    }

    /// Graded visibility. Authenticated non-members of an auto-join group get
    /// enough of it to submit a join request.
    pub fn view_access(
        &self,
        group: &Group,
        caller: Option<&Account>,
        membership: Option<&GroupMembership>,
    ) -> ViewAccess {
        if self.can_view(group, membership) {
            return ViewAccess::Full;
        }
        if caller.is_some() && group.can_join_automatically {
            return ViewAccess::JoinPreview;
        }
        ViewAccess::Denied
    }

    /// Whether the group shows up in listings for the caller.
    pub fn is_discoverable(&self, group: &Group, membership: Option<&GroupMembership>) -> bool {
        !group.hidden_for_search
            || Self::role_in(group, membership).is_some_and(|r| r.is_active_member())
    }

    /// Requires the admin role. Creating a group confers nothing once that membership is gone.
    pub fn can_modify(&self, group: &Group, membership: Option<&GroupMembership>) -> bool {
        Self::role_in(group, membership) == Some(EffectiveRole::Admin)
    }

    pub fn require_admin(
        &self,
        group: &Group,
        membership: Option<&GroupMembership>,
    ) -> Result<(), GroupsError> {
        if self.can_modify(group, membership) {
            Ok(())
        } else {
            Err(GroupsError::admin_required())
        }
    }

    /// Status a join request lands in.
    ///
    /// Rejected callers may re-request; any other existing membership is a conflict.
    pub fn can_join(
        &self,
        group: &Group,
        existing: Option<&GroupMembership>,
    ) -> Result<EffectiveRole, GroupsError> {
        match Self::role_in(group, existing) {
            Some(EffectiveRole::Rejected) | None => Ok(if group.can_join_automatically {
                EffectiveRole::Member
            } else {
                EffectiveRole::Pending
            }),
            Some(role) => Err(GroupsError::Conflict(format!(
                "You already have a {} membership in this group",
                role
            ))),
        }
    }

    /// Admins bypass post preferences; non-members are always denied.
    pub fn can_post(
        &self,
        group: &Group,
        membership: Option<&GroupMembership>,
        action: PostAction,
    ) -> bool {
        match Self::role_in(group, membership) {
            Some(EffectiveRole::Admin) => true,
            Some(EffectiveRole::Member) => {
                let prefs = group.effective_settings().post_preferences;
                match action {
                    PostAction::Send => prefs.allow_send_post,
                    PostAction::SendToSpecificMembers => {
                        prefs.allow_send_post && prefs.can_send_post_to_specific_members
                    }
                    PostAction::SendToAdmins => {
                        prefs.allow_send_post && prefs.can_send_post_to_admins
                    }
                    PostAction::Reply => prefs.can_send_post_replies,
                    PostAction::React => prefs.can_send_post_reactions,
                }
            }
            _ => false,
        }
    }

    pub fn can_create_poll(&self, group: &Group, membership: Option<&GroupMembership>) -> bool {
        match Self::role_in(group, membership) {
            Some(EffectiveRole::Admin) => true,
            Some(EffectiveRole::Member) => !group.only_admins_can_create_polls,
            _ => false,
        }
    }

    /// Denies unless the caller's account holds `permission`.
    pub fn require_permission(&self, caller: &Account, permission: &str) -> Result<(), GroupsError> {
        if caller.has_permission(permission) {
            Ok(())
        } else {
            Err(GroupsError::Forbidden(format!(
                "The {} permission is required",
                permission
            )))
        }
    }

    pub fn require_managed_admin(&self, caller: &Account) -> Result<(), GroupsError> {
        self.require_permission(caller, &self.policy.managed_group_admin_permission)
    }

    fn require_research_admin(&self, caller: &Account) -> Result<(), GroupsError> {
        self.require_permission(caller, &self.policy.research_group_admin_permission)
    }

    /// Escalations for creating a managed or research group.
    pub fn check_create(
        &self,
        caller: &Account,
        authman_enabled: bool,
        research_group: bool,
    ) -> Result<(), GroupsError> {
        if authman_enabled {
            self.require_managed_admin(caller)?;
        }
        if research_group {
            self.require_research_admin(caller)?;
        }
        Ok(())
    }

    /// Escalations for updating a group: touching directory sync fields needs the
    /// managed-group grant, and a research group (before or after) needs the research grant.
    pub fn check_update(
        &self,
        caller: &Account,
        group: &Group,
        update: &UpdateGroupRequest,
    ) -> Result<(), GroupsError> {
        let sync_changed = update
            .authman_enabled
            .is_some_and(|v| v != group.authman_enabled)
            || update
                .authman_group
                .as_ref()
                .is_some_and(|stem| group.authman_group.as_ref() != Some(stem));
        if sync_changed {
            self.require_managed_admin(caller)?;
        }
        if group.research_group || update.research_group == Some(true) {
            self.require_research_admin(caller)?;
        }
        Ok(())
    }

    /// Deleting a managed group needs the managed-group grant.
    pub fn check_delete(&self, caller: &Account, group: &Group) -> Result<(), GroupsError> {
        if group.authman_enabled {
            self.require_managed_admin(caller)?;
        }
        Ok(())
    }
}
