//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod group;
pub mod membership;

pub use group::{GroupEntity, GroupPrivacyDb, GROUP_COLUMNS};
pub use membership::{
    stored_role, GroupMembershipEntity, MembershipStatusDb, EFFECTIVE_ROLE_SQL, MEMBERSHIP_COLUMNS,
};
