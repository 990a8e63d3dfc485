//! Shared utilities and common types for the groups backend.
//!
//! This crate provides functionality used across the other crates:
//! - JWT access-token validation
//! - Offset pagination helpers
//! - Common validation logic

pub mod jwt;
pub mod pagination;
pub mod validation;
