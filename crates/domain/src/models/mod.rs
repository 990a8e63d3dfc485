//! Domain models.

pub mod account;
pub mod group;
pub mod membership;

pub use account::{Account, DirectoryAccount, MemberIdentity};
pub use group::{
    CallerPermissions, CreateGroupRequest, Group, GroupPrivacy, GroupSettings, GroupSummary, GroupView,
    ListGroupsQuery, MemberInfoPreferences, PostPreferences, UpdateGroupRequest, ViewAccess,
};
pub use membership::{
    AddMemberRequest, EffectiveRole, GroupMembership, GroupStats, JoinGroupRequest,
    ListMembersQuery, MemberAnswer, MembershipDecisionRequest, MembershipStatus,
    NotificationCategory, NotificationsPreferences, RoleTransitionError, UpdateMembershipRequest,
};
