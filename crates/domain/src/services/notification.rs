//! Notification dispatch policy for membership events.
//!
//! Decides who hears about a membership change and whether each recipient has
//! muted that category. Muted recipients are annotated, never dropped: the
//! delivery service decides what to suppress.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::CollaboratorError;
use crate::models::{EffectiveRole, Group, GroupMembership, NotificationCategory};

/// Membership change that may produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupEventKind {
    PendingMemberAdded,
    MemberAdded,
    MembershipApproved,
    MembershipRejected,
    MemberRemoved,
}

impl GroupEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupEventKind::PendingMemberAdded => "pending_member",
            GroupEventKind::MemberAdded => "member_added",
            GroupEventKind::MembershipApproved => "membership_approved",
            GroupEventKind::MembershipRejected => "membership_rejected",
            GroupEventKind::MemberRemoved => "member_removed",
        }
    }

    /// Mute category consulted for this event.
    pub fn category(&self) -> NotificationCategory {
        NotificationCategory::Invitations
    }

    /// Group admins hear about arrivals; the member hears about decisions on them.
    pub fn audience(&self) -> Audience {
        match self {
            GroupEventKind::PendingMemberAdded | GroupEventKind::MemberAdded => Audience::Admins,
            GroupEventKind::MembershipApproved
            | GroupEventKind::MembershipRejected
            | GroupEventKind::MemberRemoved => Audience::Subject,
        }
    }
}

impl std::fmt::Display for GroupEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Admins,
    Subject,
}

/// A membership change together with the context needed to notify about it.
#[derive(Debug, Clone)]
pub struct GroupEvent {
    pub kind: GroupEventKind,
    pub group_id: Uuid,
    pub group_title: String,
    pub org_id: String,
    pub app_id: String,
    /// The membership the event is about.
    pub subject: GroupMembership,
    /// User who caused the change; never notified about their own action.
    pub actor_user_id: Option<String>,
}

impl GroupEvent {
    pub fn new(
        kind: GroupEventKind,
        group: &Group,
        subject: &GroupMembership,
        actor_user_id: Option<&str>,
    ) -> Self {
        Self {
            kind,
            group_id: group.id,
            group_title: group.title.clone(),
            org_id: group.org_id.clone(),
            app_id: group.app_id.clone(),
            subject: subject.clone(),
            actor_user_id: actor_user_id.map(str::to_string),
        }
    }
}

/// One notification recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub user_id: String,
    pub name: String,
    pub mute: bool,
}

/// A fully composed notification ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub org_id: String,
    pub app_id: String,
    pub recipients: Vec<Recipient>,
    pub topic: String,
    pub subject: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

/// Recipients among `memberships` for the given category.
///
/// Memberships without a bound account and the acting user are skipped.
/// `mute` is `override_preferences && (all_mute || category_mute)`.
pub fn recipients<'a>(
    memberships: impl IntoIterator<Item = &'a GroupMembership>,
    category: NotificationCategory,
    exclude_user_id: Option<&str>,
) -> Vec<Recipient> {
    memberships
        .into_iter()
        .filter_map(|m| {
            let user_id = m.user_id.as_deref()?;
            if exclude_user_id == Some(user_id) {
                return None;
            }
            Some(Recipient {
                user_id: user_id.to_string(),
                name: m.name.clone().unwrap_or_default(),
                mute: m.notifications_preferences.is_muted(category),
            })
        })
        .collect()
}

/// Builds the notification for an event, or `None` if nobody should receive it.
///
/// `memberships` is the group's current membership list; it is only consulted
/// for admin-audience events.
pub fn plan_notification(
    event: &GroupEvent,
    memberships: &[GroupMembership],
) -> Option<Notification> {
    let category = event.kind.category();
    let exclude = event.actor_user_id.as_deref();
    let recipients = match event.kind.audience() {
        Audience::Admins => recipients(
            memberships
                .iter()
                .filter(|m| m.role == EffectiveRole::Admin),
            category,
            exclude,
        ),
        Audience::Subject => recipients(std::iter::once(&event.subject), category, exclude),
    };
    if recipients.is_empty() {
        return None;
    }

    let title = &event.group_title;
    let name = event
        .subject
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or("A new member");
    let body = match event.kind {
        GroupEventKind::MemberAdded => format!("{} joined {}", name, title),
        GroupEventKind::PendingMemberAdded => format!("{} requested to join {}", name, title),
        GroupEventKind::MembershipApproved => {
            format!("Your membership in {} has been approved", title)
        }
        GroupEventKind::MembershipRejected => {
            format!("Your membership request for {} has been rejected", title)
        }
        GroupEventKind::MemberRemoved => format!("You have been removed from {}", title),
    };

    let mut data = BTreeMap::new();
    data.insert("type".to_string(), "group".to_string());
    data.insert("operation".to_string(), event.kind.as_str().to_string());
    data.insert("entity_id".to_string(), event.group_id.to_string());
    data.insert("entity_name".to_string(), title.clone());

    Some(Notification {
        org_id: event.org_id.clone(),
        app_id: event.app_id.clone(),
        recipients,
        topic: format!("group.{}", category.as_str()),
        subject: format!("Group - {}", title),
        body,
        data,
    })
}

/// Delivers composed notifications.
#[async_trait::async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), CollaboratorError>;
}

/// Dispatcher that only logs. Used when delivery is disabled.
#[derive(Debug, Clone, Default)]
pub struct LogNotificationDispatcher {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
}

impl LogNotificationDispatcher {
    pub fn new() -> Self {
        Self {
            simulate_failure: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
        }
    }
}

#[async_trait::async_trait]
impl NotificationDispatcher for LogNotificationDispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        if self.simulate_failure {
            tracing::warn!(
                topic = %notification.topic,
                recipients = notification.recipients.len(),
                "Log dispatcher simulating failure"
            );
            return Err(CollaboratorError::Transport("Simulated failure".to_string()));
        }

        tracing::info!(
            topic = %notification.topic,
            recipients = notification.recipients.len(),
            muted = notification.recipients.iter().filter(|r| r.mute).count(),
            body = %notification.body,
            "Would send group notification"
        );
        Ok(())
    }
}
