//! Persistence layer for the groups backend.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Repository implementations
//! - [`PgGroupStore`], the PostgreSQL implementation of the domain store

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use store::{map_sqlx_error, PgGroupStore};
