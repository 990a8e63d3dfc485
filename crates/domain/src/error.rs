//! Domain error types.

use thiserror::Error;

use crate::models::RoleTransitionError;

/// Errors raised by a [`GroupStore`](crate::store::GroupStore) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

/// Errors returned by group and membership operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GroupsError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl GroupsError {
    /// Generic denial that does not reveal whether the group exists.
    pub fn access_denied() -> Self {
        GroupsError::Forbidden("You do not have access to this group".to_string())
    }

    pub fn group_not_found() -> Self {
        GroupsError::NotFound("Group not found".to_string())
    }

    pub fn membership_not_found() -> Self {
        GroupsError::NotFound("Membership not found".to_string())
    }

    pub fn admin_required() -> Self {
        GroupsError::Forbidden("Group admin role required".to_string())
    }
}

impl From<StoreError> for GroupsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => GroupsError::NotFound("Record not found".to_string()),
            StoreError::Conflict(msg) => GroupsError::Conflict(msg),
            StoreError::Database(msg) => GroupsError::Store(msg),
        }
    }
}

impl From<RoleTransitionError> for GroupsError {
    fn from(err: RoleTransitionError) -> Self {
        GroupsError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for GroupsError {
    fn from(err: validator::ValidationErrors) -> Self {
        GroupsError::Validation(err.to_string())
    }
}

/// Errors raised by external collaborators (directory, accounts, notifications).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    Decode(String),

    #[error("Not configured")]
    Disabled,
}

/// Errors that abort a reconciliation pass before any write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Group not found")]
    GroupNotFound,

    #[error("Group is not managed by the directory")]
    NotManaged,

    #[error("A synchronization pass is already running for this group")]
    Busy,

    #[error("Roster unavailable: {0}")]
    RosterUnavailable(#[from] CollaboratorError),

    #[error("Synchronization exceeded its time budget")]
    Timeout,

    #[error("Store error: {0}")]
    Store(String),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => SyncError::GroupNotFound,
            other => SyncError::Store(other.to_string()),
        }
    }
}
