//! Domain services for groups.
//!
//! Services contain business logic that operates on domain models.

pub mod authorization;
pub mod collaborators;
pub mod membership;
pub mod notification;
pub mod outbox;
pub mod reconciler;
pub mod redaction;
pub mod static_sources;

pub use authorization::{
    AuthorizationGate, AuthorizationPolicy, PostAction, MANAGED_GROUP_ADMIN, RESEARCH_GROUP_ADMIN,
};
pub use collaborators::{AccountDirectory, RosterSource, RosterSubject, SubjectDetails};
pub use membership::MembershipService;
pub use notification::{
    plan_notification, Audience, GroupEvent, GroupEventKind, LogNotificationDispatcher,
    Notification, NotificationDispatcher, Recipient,
};
pub use outbox::{NotificationOutbox, OutboxStats};
pub use reconciler::{
    plan_reconciliation, AuthmanReconciler, GroupSyncOutcome, ReconcilerConfig,
    ReconciliationPlan, SyncFailure, SyncOperation, SyncReport, SyncSummary,
};
pub use redaction::redact;
pub use static_sources::{StaticAccountDirectory, StaticRosterSource};
