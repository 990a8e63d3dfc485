//! Repository implementations for database operations.

pub mod group;
pub mod membership;

pub use group::GroupRepository;
pub use membership::MembershipRepository;
