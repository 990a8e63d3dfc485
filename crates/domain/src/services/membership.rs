//! Group and membership operations.
//!
//! Every operation loads the group and the caller's membership, asks the
//! authorization gate, writes through the store, and hands any resulting
//! notification to the outbox.

use chrono::Utc;
use shared::pagination::{Page, PageRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use super::authorization::{AuthorizationGate, PostAction};
use super::notification::{plan_notification, GroupEvent, GroupEventKind};
use super::outbox::NotificationOutbox;
use super::redaction::redact;
use crate::error::{GroupsError, StoreError};
use crate::models::{
    Account, AddMemberRequest, CallerPermissions, CreateGroupRequest, EffectiveRole, Group,
    GroupMembership, GroupSummary, GroupView, JoinGroupRequest, ListGroupsQuery,
    ListMembersQuery, MemberIdentity, MembershipDecisionRequest, NotificationsPreferences,
    UpdateGroupRequest, UpdateMembershipRequest, ViewAccess,
};
use crate::store::{GroupFilter, GroupStore, MembershipFilter};

pub struct MembershipService {
    store: Arc<dyn GroupStore>,
    gate: AuthorizationGate,
    outbox: NotificationOutbox,
}

impl MembershipService {
    pub fn new(store: Arc<dyn GroupStore>, gate: AuthorizationGate, outbox: NotificationOutbox) -> Self {
        Self {
            store,
            gate,
            outbox,
        }
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }


    pub async fn create_group(
        &self,
        caller: &Account,
        request: CreateGroupRequest,
    ) -> Result<Group, GroupsError> {
        request.validate()?;
        self.gate
            .check_create(caller, request.authman_enabled, request.research_group)?;

        let now = Utc::now();
        let group = Group::from_request(&caller.org_id, &caller.app_id, request, now);
        if group.authman_enabled && !group.is_managed() {
            return Err(GroupsError::Validation(
                "authman_group is required when authman_enabled is set".to_string(),
            ));
        }
        if self
            .store
            .find_group_by_title(&group.org_id, &group.title)
            .await?
            .is_some()
        {
            return Err(GroupsError::Conflict(
                "A group with this title already exists".to_string(),
            ));
        }

        let creator = GroupMembership::new(&group.org_id, group.id, EffectiveRole::Admin, now)
            .with_identity(&MemberIdentity::from(caller));
        self.store.create_group(&group, &creator).await?;

        info!(
            group_id = %group.id,
            org_id = %group.org_id,
            user_id = %caller.user_id,
            managed = group.is_managed(),
            "Group created"
        );
        Ok(group)
    }

    /// Missing groups and denied groups produce the same error.
    pub async fn get_group(
        &self,
        caller: Option<&Account>,
        group_id: Uuid,
    ) -> Result<GroupView, GroupsError> {
        let group = self
            .store
            .find_group(group_id)
            .await?
            .ok_or_else(GroupsError::access_denied)?;
        let membership = self.caller_membership(caller, group.id).await?;

        let access = self.gate.view_access(&group, caller, membership.as_ref());
        let your_role = membership.as_ref().map(|m| m.role);
        match access {
            ViewAccess::Denied => Err(GroupsError::access_denied()),
            ViewAccess::JoinPreview => Ok(GroupView {
                access,
                group: GroupSummary::from_group(&group, your_role),
                details: None,
                your_membership: membership,
                stats: None,
                your_permissions: None,
            }),
            ViewAccess::Full => {
                let is_member = your_role.is_some_and(|r| r.is_active_member());
                let stats = if is_member {
                    Some(self.store.group_stats(group.id).await?)
                } else {
                    None
                };
                let your_permissions =
                    is_member.then(|| self.caller_permissions(&group, membership.as_ref()));
                Ok(GroupView {
                    access,
                    group: GroupSummary::from_group(&group, your_role),
                    details: Some(group),
                    your_membership: membership,
                    stats,
                    your_permissions,
                })
            }
        }
    }

    pub async fn list_groups(
        &self,
        caller: Option<&Account>,
        query: ListGroupsQuery,
    ) -> Result<Page<GroupSummary>, GroupsError> {
        let org_id = match (caller, &query.org_id) {
            (Some(account), _) => account.org_id.clone(),
            (None, Some(org_id)) => org_id.clone(),
            (None, None) => {
                return Err(GroupsError::Validation(
                    "org_id is required for anonymous requests".to_string(),
                ))
            }
        };

        let memberships: HashMap<Uuid, GroupMembership> = match caller {
            Some(account) => self
                .store
                .list_user_memberships(&org_id, &account.user_id, account.external_id.as_deref())
                .await?
                .into_iter()
                .map(|m| (m.group_id, m))
                .collect(),
            None => HashMap::new(),
        };

        let filter = GroupFilter {
            org_id,
            title: query.title.filter(|t| !t.trim().is_empty()),
            category: query.category,
        };
        let summaries: Vec<GroupSummary> = self
            .store
            .list_groups(&filter)
            .await?
            .iter()
            .filter_map(|group| {
                let membership = memberships.get(&group.id);
                self.gate
                    .is_discoverable(group, membership)
                    .then(|| GroupSummary::from_group(group, membership.map(|m| m.role)))
            })
            .collect();

        Ok(PageRequest::from_query(query.page, query.per_page).apply(summaries))
    }

    pub async fn update_group(
        &self,
        caller: &Account,
        group_id: Uuid,
        request: UpdateGroupRequest,
    ) -> Result<Group, GroupsError> {
        request.validate()?;
        let mut group = self.load_group(group_id).await?;
        let membership = self.caller_membership(Some(caller), group.id).await?;
        self.gate.require_admin(&group, membership.as_ref())?;
        self.gate.check_update(caller, &group, &request)?;

        if let Some(title) = request.title.as_deref() {
            if let Some(existing) = self.store.find_group_by_title(&group.org_id, title).await? {
                if existing.id != group.id {
                    return Err(GroupsError::Conflict(
                        "A group with this title already exists".to_string(),
                    ));
                }
            }
        }

        group.apply_update(request, Utc::now());
        if group.authman_enabled && !group.is_managed() {
            return Err(GroupsError::Validation(
                "authman_group is required when authman_enabled is set".to_string(),
            ));
        }
        self.store.update_group(&group).await?;

        info!(group_id = %group.id, user_id = %caller.user_id, "Group updated");
        Ok(group)
    }

    pub async fn delete_group(&self, caller: &Account, group_id: Uuid) -> Result<(), GroupsError> {
        let group = self.load_group(group_id).await?;
        let membership = self.caller_membership(Some(caller), group.id).await?;
        self.gate.require_admin(&group, membership.as_ref())?;
        self.gate.check_delete(caller, &group)?;

        self.store.delete_group(group.id).await?;
        info!(group_id = %group.id, user_id = %caller.user_id, "Group deleted");
        Ok(())
    }

    /// Groups the caller belongs to in any status.
    ///
    /// Directory-created memberships carrying the caller's external identifier
    /// are bound to the caller's account on the way.
    pub async fn user_groups(&self, caller: &Account) -> Result<Vec<GroupSummary>, GroupsError> {
        let memberships = self
            .store
            .list_user_memberships(&caller.org_id, &caller.user_id, caller.external_id.as_deref())
            .await?;

        let identity = MemberIdentity::from(caller);
        let mut summaries = Vec::with_capacity(memberships.len());
        for mut membership in memberships {
            if membership.user_id.is_none() && membership.apply_identity_if_empty(&identity) {
                membership.date_updated = Utc::now();
                match self.store.update_membership(&membership).await {
                    Ok(()) => info!(
                        membership_id = %membership.id,
                        user_id = %caller.user_id,
                        "Bound directory membership to account"
                    ),
                    Err(StoreError::Conflict(_)) => {
                        warn!(
                            membership_id = %membership.id,
                            user_id = %caller.user_id,
                            "Account already holds another membership in this group"
                        );
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            if let Some(group) = self.store.find_group(membership.group_id).await? {
                summaries.push(GroupSummary::from_group(&group, Some(membership.role)));
            }
        }
        summaries.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        Ok(summaries)
    }

    /// Checks that the caller may trigger a directory sync for the group.
    pub async fn authorize_sync(&self, caller: &Account, group_id: Uuid) -> Result<(), GroupsError> {
        let group = self.load_group(group_id).await?;
        let membership = self.caller_membership(Some(caller), group.id).await?;
        self.gate.require_admin(&group, membership.as_ref())?;
        self.gate.require_managed_admin(caller)
    }


    pub async fn request_join(
        &self,
        caller: &Account,
        group_id: Uuid,
        request: JoinGroupRequest,
    ) -> Result<GroupMembership, GroupsError> {
        request.validate()?;
        let group = self.load_group(group_id).await?;
        if group.is_managed() {
            return Err(GroupsError::Forbidden(
                "Membership of this group is managed by the directory".to_string(),
            ));
        }
        for question in &group.membership_questions {
            let answered = request.member_answers.iter().any(|a| {
                a.question.trim().eq_ignore_ascii_case(question.trim())
                    && !a.answer.trim().is_empty()
            });
            if !answered {
                return Err(GroupsError::Validation(format!(
                    "An answer is required for: {}",
                    question
                )));
            }
        }

        let existing = self.caller_membership(Some(caller), group.id).await?;
        let role = self.gate.can_join(&group, existing.as_ref())?;
        let now = Utc::now();
        let identity = MemberIdentity::from(caller);

        let membership = match existing {
            Some(mut rejected) => {
                rejected.set_role_unchecked(role, None, now);
                rejected.member_answers = request.member_answers;
                rejected.apply_identity_if_empty(&identity);
                self.store.update_membership(&rejected).await?;
                rejected
            }
            None => {
                let mut membership = GroupMembership::new(&group.org_id, group.id, role, now)
                    .with_identity(&identity);
                membership.member_answers = request.member_answers;
                self.store.create_membership(&membership).await?;
                membership
            }
        };

        info!(
            group_id = %group.id,
            user_id = %caller.user_id,
            status = %membership.role,
            "Join request recorded"
        );
        let kind = if membership.role == EffectiveRole::Member {
            GroupEventKind::MemberAdded
        } else {
            GroupEventKind::PendingMemberAdded
        };
        self.notify(kind, &group, &membership, &caller.user_id).await;
        Ok(membership)
    }

    pub async fn leave(&self, caller: &Account, group_id: Uuid) -> Result<(), GroupsError> {
        let group = self.load_group(group_id).await?;
        let membership = self
            .caller_membership(Some(caller), group.id)
            .await?
            .ok_or_else(GroupsError::membership_not_found)?;
        if membership.role == EffectiveRole::Admin {
            self.ensure_other_admin(group.id, "The last admin cannot leave the group")
                .await?;
        }
        self.store.delete_membership(membership.id).await?;
        info!(group_id = %group.id, user_id = %caller.user_id, "Member left group");
        Ok(())
    }

    pub async fn add_member(
        &self,
        caller: &Account,
        group_id: Uuid,
        request: AddMemberRequest,
    ) -> Result<GroupMembership, GroupsError> {
        request.validate()?;
        let group = self.load_group(group_id).await?;
        let caller_membership = self.caller_membership(Some(caller), group.id).await?;
        self.gate.require_admin(&group, caller_membership.as_ref())?;
        if request.user_id.is_none() && request.external_id.is_none() {
            return Err(GroupsError::Validation(
                "Either user_id or external_id is required".to_string(),
            ));
        }

        let role = if request.admin {
            EffectiveRole::Admin
        } else {
            EffectiveRole::Member
        };
        let identity = MemberIdentity {
            user_id: request.user_id,
            external_id: request.external_id,
            net_id: request.net_id,
            name: request.name,
            email: request.email,
            photo_url: None,
        };
        let membership =
            GroupMembership::new(&group.org_id, group.id, role, Utc::now()).with_identity(&identity);
        self.store.create_membership(&membership).await?;

        info!(
            group_id = %group.id,
            membership_id = %membership.id,
            added_by = %caller.user_id,
            "Member added"
        );
        Ok(membership)
    }

    pub async fn decide_pending(
        &self,
        caller: &Account,
        membership_id: Uuid,
        decision: MembershipDecisionRequest,
    ) -> Result<GroupMembership, GroupsError> {
        decision.validate()?;
        let (group, mut membership) = self.load_for_admin(caller, membership_id).await?;
        if membership.role != EffectiveRole::Pending {
            return Err(GroupsError::Conflict("Membership is not pending".to_string()));
        }

        let (next, kind) = if decision.approve {
            (EffectiveRole::Member, GroupEventKind::MembershipApproved)
        } else {
            (EffectiveRole::Rejected, GroupEventKind::MembershipRejected)
        };
        membership.change_role(next, decision.reject_reason, Utc::now())?;
        self.store.update_membership(&membership).await?;

        info!(
            group_id = %group.id,
            membership_id = %membership.id,
            status = %membership.role,
            decided_by = %caller.user_id,
            "Pending membership decided"
        );
        self.notify(kind, &group, &membership, &caller.user_id).await;
        Ok(membership)
    }

    pub async fn update_membership(
        &self,
        caller: &Account,
        membership_id: Uuid,
        request: UpdateMembershipRequest,
    ) -> Result<GroupMembership, GroupsError> {
        let (group, mut membership) = self.load_for_admin(caller, membership_id).await?;
        let previous = membership.role;
        if previous == EffectiveRole::Admin && request.status != EffectiveRole::Admin {
            self.ensure_other_admin(group.id, "The last admin cannot be demoted")
                .await?;
        }
        membership.change_role(request.status, request.reject_reason, Utc::now())?;
        if previous == membership.role {
            return Ok(membership);
        }
        self.store.update_membership(&membership).await?;

        info!(
            group_id = %group.id,
            membership_id = %membership.id,
            from = %previous,
            to = %membership.role,
            updated_by = %caller.user_id,
            "Membership role changed"
        );
        let kind = match (previous, membership.role) {
            (EffectiveRole::Pending, EffectiveRole::Member) => Some(GroupEventKind::MembershipApproved),
            (_, EffectiveRole::Rejected) => Some(GroupEventKind::MembershipRejected),
            _ => None,
        };
        if let Some(kind) = kind {
            self.notify(kind, &group, &membership, &caller.user_id).await;
        }
        Ok(membership)
    }

    pub async fn remove_member(&self, caller: &Account, membership_id: Uuid) -> Result<(), GroupsError> {
        let (group, membership) = self.load_for_admin(caller, membership_id).await?;
        if membership.role == EffectiveRole::Admin {
            self.ensure_other_admin(group.id, "The last admin cannot be removed")
                .await?;
        }
        self.store.delete_membership(membership.id).await?;

        info!(
            group_id = %group.id,
            membership_id = %membership.id,
            removed_by = %caller.user_id,
            "Member removed"
        );
        self.notify(GroupEventKind::MemberRemoved, &group, &membership, &caller.user_id)
            .await;
        Ok(())
    }

    /// Records attendance without touching the membership status.
    pub async fn mark_attended(
        &self,
        caller: &Account,
        membership_id: Uuid,
    ) -> Result<GroupMembership, GroupsError> {
        let (group, mut membership) = self.load_for_admin(caller, membership_id).await?;
        if !group.attendance_group {
            return Err(GroupsError::Validation(
                "This group does not track attendance".to_string(),
            ));
        }
        let now = Utc::now();
        membership.date_attended = Some(now);
        membership.date_updated = now;
        self.store.update_membership(&membership).await?;
        Ok(membership)
    }

    pub async fn update_notification_preferences(
        &self,
        caller: &Account,
        group_id: Uuid,
        preferences: NotificationsPreferences,
    ) -> Result<GroupMembership, GroupsError> {
        let mut membership = self
            .caller_membership(Some(caller), group_id)
            .await?
            .ok_or_else(GroupsError::membership_not_found)?;
        membership.notifications_preferences = preferences;
        membership.date_updated = Utc::now();
        self.store.update_membership(&membership).await?;
        Ok(membership)
    }

    /// Members visible to the caller, redacted per group settings.
    ///
    /// Admins see every status; everyone else sees members and admins only.
    pub async fn list_members(
        &self,
        caller: &Account,
        group_id: Uuid,
        query: ListMembersQuery,
    ) -> Result<Page<GroupMembership>, GroupsError> {
        let group = self
            .store
            .find_group(group_id)
            .await?
            .ok_or_else(GroupsError::access_denied)?;
        let membership = self.caller_membership(Some(caller), group.id).await?;
        if !self.gate.can_view(&group, membership.as_ref()) {
            return Err(GroupsError::access_denied());
        }
        let viewer_is_admin = self.gate.can_modify(&group, membership.as_ref());

        let requested = query.statuses().map_err(GroupsError::Validation)?;
        let roles = if viewer_is_admin {
            requested
        } else {
            let visible = [EffectiveRole::Member, EffectiveRole::Admin];
            if requested.is_empty() {
                visible.to_vec()
            } else {
                let allowed: Vec<EffectiveRole> =
                    requested.into_iter().filter(|r| visible.contains(r)).collect();
                if allowed.is_empty() {
                    return Ok(PageRequest::from_query(query.page, query.per_page).apply(Vec::new()));
                }
                allowed
            }
        };

        let members: Vec<GroupMembership> = self
            .store
            .list_memberships(group.id, &MembershipFilter::roles(&roles))
            .await?
            .iter()
            .map(|m| redact(m, group.settings.as_ref(), viewer_is_admin))
            .collect();

        Ok(PageRequest::from_query(query.page, query.per_page).apply(members))
    }


    async fn load_group(&self, group_id: Uuid) -> Result<Group, GroupsError> {
        self.store
            .find_group(group_id)
            .await?
            .ok_or_else(GroupsError::group_not_found)
    }

    /// The caller's membership in a group.
    ///
    /// Falls back to an unbound directory record carrying the caller's external
    /// identifier and binds it to the account.
    async fn caller_membership(
        &self,
        caller: Option<&Account>,
        group_id: Uuid,
    ) -> Result<Option<GroupMembership>, GroupsError> {
        let Some(account) = caller else {
            return Ok(None);
        };
        if let Some(membership) = self
            .store
            .find_user_membership(group_id, &account.user_id)
            .await?
        {
            return Ok(Some(membership));
        }
        let Some(external_id) = account.external_id.as_deref() else {
            return Ok(None);
        };

        let unbound = self
            .store
            .list_user_memberships(&account.org_id, &account.user_id, Some(external_id))
            .await?
            .into_iter()
            .find(|m| m.group_id == group_id && m.user_id.is_none());
        let Some(mut membership) = unbound else {
            return Ok(None);
        };
        if membership.apply_identity_if_empty(&MemberIdentity::from(account)) {
            membership.date_updated = Utc::now();
            self.store.update_membership(&membership).await?;
            info!(
                membership_id = %membership.id,
                user_id = %account.user_id,
                "Bound directory membership to account"
            );
        }
        Ok(Some(membership))
    }

    /// Loads a membership and its group, requiring the caller to administer the group.
    async fn load_for_admin(
        &self,
        caller: &Account,
        membership_id: Uuid,
    ) -> Result<(Group, GroupMembership), GroupsError> {
        let membership = self
            .store
            .find_membership(membership_id)
            .await?
            .ok_or_else(GroupsError::membership_not_found)?;
        let group = self.load_group(membership.group_id).await?;
        let caller_membership = self.caller_membership(Some(caller), group.id).await?;
        self.gate.require_admin(&group, caller_membership.as_ref())?;
        Ok((group, membership))
    }

    async fn ensure_other_admin(&self, group_id: Uuid, message: &str) -> Result<(), GroupsError> {
        let admins = self
            .store
            .list_memberships(group_id, &MembershipFilter::roles(&[EffectiveRole::Admin]))
            .await?;
        if admins.len() <= 1 {
            return Err(GroupsError::Conflict(message.to_string()));
        }
        Ok(())
    }

    fn caller_permissions(
        &self,
        group: &Group,
        membership: Option<&GroupMembership>,
    ) -> CallerPermissions {
        CallerPermissions {
            can_modify: self.gate.can_modify(group, membership),
            can_send_post: self.gate.can_post(group, membership, PostAction::Send),
            can_send_post_to_specific_members: self.gate.can_post(
                group,
                membership,
                PostAction::SendToSpecificMembers,
            ),
            can_send_post_to_admins: self.gate.can_post(group, membership, PostAction::SendToAdmins),
            can_reply: self.gate.can_post(group, membership, PostAction::Reply),
            can_react: self.gate.can_post(group, membership, PostAction::React),
            can_create_poll: self.gate.can_create_poll(group, membership),
        }
    }

    /// Plans and enqueues a notification. Failures never affect the caller.
    async fn notify(
        &self,
        kind: GroupEventKind,
        group: &Group,
        subject: &GroupMembership,
        actor_user_id: &str,
    ) {
        let event = GroupEvent::new(kind, group, subject, Some(actor_user_id));
        let admins = if kind.audience() == super::notification::Audience::Admins {
            match self
                .store
                .list_memberships(group.id, &MembershipFilter::roles(&[EffectiveRole::Admin]))
                .await
            {
                Ok(admins) => admins,
                Err(e) => {
                    warn!(group_id = %group.id, error = %e, "Could not load admins for notification");
                    return;
                }
            }
        } else {
            Vec::new()
        };
        if let Some(notification) = plan_notification(&event, &admins) {
            self.outbox.enqueue(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use crate::models::{GroupPrivacy, GroupSettings, MemberAnswer, MemberInfoPreferences};
    use crate::services::authorization::{AuthorizationPolicy, MANAGED_GROUP_ADMIN};
    use crate::services::notification::{Notification, NotificationDispatcher};
    use crate::store::MemoryStore;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait::async_trait]
    impl NotificationDispatcher for Recording {
        async fn send(&self, notification: &Notification) -> Result<(), CollaboratorError> {
            self.sent.lock().await.push(notification.clone());
            Ok(())
        }
    }

    struct Fixture {
        service: MembershipService,
        store: Arc<MemoryStore>,
        outbox: NotificationOutbox,
        recording: Arc<Recording>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let recording = Arc::new(Recording::default());
            let (outbox, _handle) = NotificationOutbox::spawn(recording.clone());
            let service = MembershipService::new(
                store.clone(),
                AuthorizationGate::new(AuthorizationPolicy::default()),
                outbox.clone(),
            );
            Self {
                service,
                store,
                outbox,
                recording,
            }
        }

        async fn sent(&self) -> Vec<Notification> {
            self.outbox.flush().await;
            self.recording.sent.lock().await.clone()
        }

        async fn group(&self, owner: &Account, request: CreateGroupRequest) -> Group {
            self.service.create_group(owner, request).await.unwrap()
        }
    }

    fn account(user_id: &str) -> Account {
        Account {
            user_id: user_id.into(),
            org_id: "org".into(),
            app_id: "app".into(),
            external_id: Some(format!("ext-{}", user_id)),
            net_id: None,
            name: Some(format!("User {}", user_id)),
            email: None,
            permissions: vec![],
        }
    }

    fn titled(title: &str) -> CreateGroupRequest {
        CreateGroupRequest {
            title: title.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_group_makes_creator_admin() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx.group(&owner, titled("Chess")).await;

        let membership = fx
            .store
            .find_user_membership(group.id, "owner")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.role, EffectiveRole::Admin);
        assert_eq!(membership.name.as_deref(), Some("User owner"));
    }

    #[tokio::test]
    async fn test_create_group_title_conflict_and_permissions() {
        let fx = Fixture::new();
        let owner = account("owner");
        fx.group(&owner, titled("Chess")).await;

        let err = fx
            .service
            .create_group(&owner, titled("chess"))
            .await
            .unwrap_err();
        assert!(matches!(err, GroupsError::Conflict(_)));

        let managed = CreateGroupRequest {
            title: "Managed".into(),
            authman_enabled: true,
            authman_group: Some("stem:x".into()),
            ..Default::default()
        };
        let err = fx.service.create_group(&owner, managed.clone()).await.unwrap_err();
        assert!(matches!(err, GroupsError::Forbidden(_)));

        let mut privileged = account("privileged");
        privileged.permissions = vec![MANAGED_GROUP_ADMIN.into()];
        assert!(fx.service.create_group(&privileged, managed).await.is_ok());
    }

    #[tokio::test]
    async fn test_join_pending_then_duplicate_conflict() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx.group(&owner, titled("Chess")).await;
        let joiner = account("joiner");

        let membership = fx
            .service
            .request_join(&joiner, group.id, JoinGroupRequest::default())
            .await
            .unwrap();
        assert_eq!(membership.role, EffectiveRole::Pending);

        let err = fx
            .service
            .request_join(&joiner, group.id, JoinGroupRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GroupsError::Conflict(_)));

        let sent = fx.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients[0].user_id, "owner");
        assert_eq!(sent[0].body, "User joiner requested to join Chess");
    }

    #[tokio::test]
    async fn test_rejected_user_may_request_again() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx.group(&owner, titled("Chess")).await;
        let joiner = account("joiner");
        let pending = fx
            .service
            .request_join(&joiner, group.id, JoinGroupRequest::default())
            .await
            .unwrap();

        let rejected = fx
            .service
            .decide_pending(
                &owner,
                pending.id,
                MembershipDecisionRequest {
                    approve: false,
                    reject_reason: Some("Not now".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.role, EffectiveRole::Rejected);
        assert_eq!(rejected.reject_reason.as_deref(), Some("Not now"));

        let again = fx
            .service
            .request_join(&joiner, group.id, JoinGroupRequest::default())
            .await
            .unwrap();
        assert_eq!(again.id, pending.id, "record is reused");
        assert_eq!(again.role, EffectiveRole::Pending);
        assert!(again.reject_reason.is_none());
    }

    #[tokio::test]
    async fn test_auto_join_and_questions() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx
            .group(
                &owner,
                CreateGroupRequest {
                    title: "Open".into(),
                    can_join_automatically: true,
                    membership_questions: vec!["Why?".into()],
                    ..Default::default()
                },
            )
            .await;
        let joiner = account("joiner");

        let err = fx
            .service
            .request_join(&joiner, group.id, JoinGroupRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GroupsError::Validation(_)));

        let membership = fx
            .service
            .request_join(
                &joiner,
                group.id,
                JoinGroupRequest {
                    member_answers: vec![MemberAnswer {
                        question: "why?".into(),
                        answer: "Fun".into(),
                    }],
                },
            )
            .await
            .unwrap();
        assert_eq!(membership.role, EffectiveRole::Member);
        assert_eq!(fx.sent().await[0].body, "User joiner joined Open");
    }

    #[tokio::test]
    async fn test_managed_group_rejects_manual_join() {
        let fx = Fixture::new();
        let mut owner = account("owner");
        owner.permissions = vec![MANAGED_GROUP_ADMIN.into()];
        let group = fx
            .group(
                &owner,
                CreateGroupRequest {
                    title: "Managed".into(),
                    authman_enabled: true,
                    authman_group: Some("stem:x".into()),
                    ..Default::default()
                },
            )
            .await;

        let err = fx
            .service
            .request_join(&account("joiner"), group.id, JoinGroupRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GroupsError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_last_admin_protection() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx.group(&owner, titled("Chess")).await;
        let owner_membership = fx
            .store
            .find_user_membership(group.id, "owner")
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            fx.service.leave(&owner, group.id).await,
            Err(GroupsError::Conflict(_))
        ));
        assert!(matches!(
            fx.service
                .update_membership(
                    &owner,
                    owner_membership.id,
                    UpdateMembershipRequest {
                        status: EffectiveRole::Member,
                        reject_reason: None,
                    },
                )
                .await,
            Err(GroupsError::Conflict(_))
        ));

        let second = fx
            .service
            .add_member(
                &owner,
                group.id,
                AddMemberRequest {
                    user_id: Some("second".into()),
                    external_id: None,
                    name: None,
                    email: None,
                    net_id: None,
                    admin: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(second.role, EffectiveRole::Admin);
        fx.service.leave(&owner, group.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_illegal_transition_is_validation_error() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx.group(&owner, titled("Chess")).await;
        let member = fx
            .service
            .add_member(
                &owner,
                group.id,
                AddMemberRequest {
                    user_id: Some("m".into()),
                    external_id: None,
                    name: None,
                    email: None,
                    net_id: None,
                    admin: false,
                },
            )
            .await
            .unwrap();

        let err = fx
            .service
            .update_membership(
                &owner,
                member.id,
                UpdateMembershipRequest {
                    status: EffectiveRole::Pending,
                    reject_reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GroupsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_non_admin_cannot_manage_members() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx
            .group(
                &owner,
                CreateGroupRequest {
                    title: "Open".into(),
                    can_join_automatically: true,
                    ..Default::default()
                },
            )
            .await;
        let member = account("member");
        fx.service
            .request_join(&member, group.id, JoinGroupRequest::default())
            .await
            .unwrap();
        let owner_membership = fx
            .store
            .find_user_membership(group.id, "owner")
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            fx.service.remove_member(&member, owner_membership.id).await,
            Err(GroupsError::Forbidden(_))
        ));
        assert!(matches!(
            fx.service.delete_group(&member, group.id).await,
            Err(GroupsError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_get_group_hides_existence() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx
            .group(
                &owner,
                CreateGroupRequest {
                    title: "Secret".into(),
                    privacy: GroupPrivacy::Private,
                    ..Default::default()
                },
            )
            .await;

        let outsider = account("outsider");
        let denied = fx.service.get_group(Some(&outsider), group.id).await.unwrap_err();
        let missing = fx
            .service
            .get_group(Some(&outsider), Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(denied, missing);

        let view = fx.service.get_group(Some(&owner), group.id).await.unwrap();
        assert_eq!(view.access, ViewAccess::Full);
        assert_eq!(view.stats.unwrap().admins_count, 1);
        assert!(view.your_permissions.unwrap().can_modify);
    }

    #[tokio::test]
    async fn test_join_preview_for_auto_join_private_group() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx
            .group(
                &owner,
                CreateGroupRequest {
                    title: "Private Open".into(),
                    privacy: GroupPrivacy::Private,
                    can_join_automatically: true,
                    membership_questions: vec!["Major?".into()],
                    ..Default::default()
                },
            )
            .await;

        let view = fx
            .service
            .get_group(Some(&account("outsider")), group.id)
            .await
            .unwrap();
        assert_eq!(view.access, ViewAccess::JoinPreview);
        assert!(view.details.is_none());
        assert_eq!(view.group.membership_questions, vec!["Major?".to_string()]);

        assert!(fx.service.get_group(None, group.id).await.is_err());
    }

    #[tokio::test]
    async fn test_list_groups_hides_hidden_groups_from_non_members() {
        let fx = Fixture::new();
        let owner = account("owner");
        fx.group(&owner, titled("Visible")).await;
        fx.group(
            &owner,
            CreateGroupRequest {
                title: "Hidden".into(),
                hidden_for_search: true,
                ..Default::default()
            },
        )
        .await;

        let outsider = fx
            .service
            .list_groups(Some(&account("outsider")), ListGroupsQuery::default())
            .await
            .unwrap();
        assert_eq!(outsider.pagination.total, 1);
        assert_eq!(outsider.data[0].title, "Visible");

        let mine = fx
            .service
            .list_groups(Some(&owner), ListGroupsQuery::default())
            .await
            .unwrap();
        assert_eq!(mine.pagination.total, 2);
        assert!(mine.data.iter().all(|g| g.your_role == Some(EffectiveRole::Admin)));

        assert!(matches!(
            fx.service.list_groups(None, ListGroupsQuery::default()).await,
            Err(GroupsError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_list_members_redacts_for_non_admins() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx
            .group(
                &owner,
                CreateGroupRequest {
                    title: "Quiet".into(),
                    settings: Some(GroupSettings {
                        member_info_preferences: MemberInfoPreferences {
                            can_view_member_name: false,
                            ..Default::default()
                        },
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .await;
        let member = account("member");
        let pending = fx
            .service
            .request_join(&member, group.id, JoinGroupRequest::default())
            .await
            .unwrap();
        fx.service
            .decide_pending(
                &owner,
                pending.id,
                MembershipDecisionRequest {
                    approve: true,
                    reject_reason: None,
                },
            )
            .await
            .unwrap();
        let waiting = account("waiting");
        fx.service
            .request_join(&waiting, group.id, JoinGroupRequest::default())
            .await
            .unwrap();

        let as_member = fx
            .service
            .list_members(&member, group.id, ListMembersQuery::default())
            .await
            .unwrap();
        assert_eq!(as_member.pagination.total, 2, "pending hidden from members");
        assert!(as_member.data.iter().all(|m| m.name.is_none() && m.external_id.is_none()));

        let as_admin = fx
            .service
            .list_members(&owner, group.id, ListMembersQuery::default())
            .await
            .unwrap();
        assert_eq!(as_admin.pagination.total, 3);
        assert!(as_admin.data.iter().all(|m| m.external_id.is_some()));
    }

    #[tokio::test]
    async fn test_decision_and_removal_notify_subject() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx.group(&owner, titled("Chess")).await;
        let joiner = account("joiner");
        let pending = fx
            .service
            .request_join(&joiner, group.id, JoinGroupRequest::default())
            .await
            .unwrap();
        fx.service
            .decide_pending(
                &owner,
                pending.id,
                MembershipDecisionRequest {
                    approve: true,
                    reject_reason: None,
                },
            )
            .await
            .unwrap();
        fx.service.remove_member(&owner, pending.id).await.unwrap();

        let sent = fx.sent().await;
        let bodies: Vec<&str> = sent.iter().map(|n| n.body.as_str()).collect();
        assert_eq!(
            bodies,
            vec![
                "User joiner requested to join Chess",
                "Your membership in Chess has been approved",
                "You have been removed from Chess",
            ]
        );
        assert!(sent[1..].iter().all(|n| n.recipients[0].user_id == "joiner"));
    }

    #[tokio::test]
    async fn test_mark_attended_requires_attendance_group() {
        let fx = Fixture::new();
        let owner = account("owner");
        let plain = fx.group(&owner, titled("Plain")).await;
        let attendance = fx
            .group(
                &owner,
                CreateGroupRequest {
                    title: "Attendance".into(),
                    attendance_group: true,
                    ..Default::default()
                },
            )
            .await;
        let plain_admin = fx.store.find_user_membership(plain.id, "owner").await.unwrap().unwrap();
        let attendance_admin = fx
            .store
            .find_user_membership(attendance.id, "owner")
            .await
            .unwrap()
            .unwrap();

        assert!(matches!(
            fx.service.mark_attended(&owner, plain_admin.id).await,
            Err(GroupsError::Validation(_))
        ));
        let marked = fx.service.mark_attended(&owner, attendance_admin.id).await.unwrap();
        assert!(marked.date_attended.is_some());
        assert_eq!(marked.role, EffectiveRole::Admin);
    }

    #[tokio::test]
    async fn test_user_groups_binds_directory_membership() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx.group(&owner, titled("Synced")).await;
        let mut unbound = GroupMembership::new("org", group.id, EffectiveRole::Member, Utc::now());
        unbound.external_id = Some("ext-student".into());
        fx.store.insert_membership(unbound.clone()).await;

        let student = account("student");
        let groups = fx.service.user_groups(&student).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].your_role, Some(EffectiveRole::Member));

        let bound = fx.store.find_membership(unbound.id).await.unwrap().unwrap();
        assert_eq!(bound.user_id.as_deref(), Some("student"));
    }

    #[tokio::test]
    async fn test_directory_member_can_view_before_binding() {
        let fx = Fixture::new();
        let mut owner = account("owner");
        owner.permissions = vec![MANAGED_GROUP_ADMIN.into()];
        let group = fx
            .group(
                &owner,
                CreateGroupRequest {
                    title: "Roster".into(),
                    privacy: GroupPrivacy::Private,
                    hidden_for_search: true,
                    authman_enabled: true,
                    authman_group: Some("stem:roster".into()),
                    ..Default::default()
                },
            )
            .await;
        let mut unbound = GroupMembership::new("org", group.id, EffectiveRole::Member, Utc::now());
        unbound.external_id = Some("ext-alice".into());
        fx.store.insert_membership(unbound.clone()).await;

        let alice = account("alice");
        let view = fx.service.get_group(Some(&alice), group.id).await.unwrap();
        assert_eq!(view.access, ViewAccess::Full);
        assert_eq!(view.your_membership.unwrap().id, unbound.id);

        let members = fx
            .service
            .list_members(&alice, group.id, ListMembersQuery::default())
            .await
            .unwrap();
        assert_eq!(members.pagination.total, 2);

        let bound = fx.store.find_membership(unbound.id).await.unwrap().unwrap();
        assert_eq!(bound.user_id.as_deref(), Some("alice"));
        assert!(fx.service.get_group(Some(&account("bob")), group.id).await.is_err());
    }

    #[tokio::test]
    async fn test_notification_preferences_update() {
        let fx = Fixture::new();
        let owner = account("owner");
        let group = fx.group(&owner, titled("Chess")).await;
        let prefs = NotificationsPreferences {
            override_preferences: true,
            posts_mute: true,
            ..Default::default()
        };
        let updated = fx
            .service
            .update_notification_preferences(&owner, group.id, prefs)
            .await
            .unwrap();
        assert_eq!(updated.notifications_preferences, prefs);

        assert!(matches!(
            fx.service
                .update_notification_preferences(&account("stranger"), group.id, prefs)
                .await,
            Err(GroupsError::NotFound(_))
        ));
    }
}
