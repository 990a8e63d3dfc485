//! Domain layer for the groups backend.
//!
//! This crate contains:
//! - Group and membership models
//! - The store abstraction and its in-memory implementation
//! - Authorization, redaction, notification and directory reconciliation services
//! - Domain error types

pub mod error;
pub mod models;
pub mod services;
pub mod store;

pub use error::{CollaboratorError, GroupsError, StoreError, SyncError};
