//! Contracts for the external services the domain depends on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CollaboratorError;
use crate::models::DirectoryAccount;

/// One entry of an external group roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterSubject {
    /// External identifier (e.g. UIN).
    pub id: String,
    /// Identifier source type reported by the directory.
    #[serde(rename = "sourceId", alias = "source_id", default)]
    pub source_id: String,
}

/// Name and email reported by the directory for a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDetails {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Directory service holding authoritative rosters for managed groups.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch_group_members(&self, stem: &str) -> Result<Vec<RosterSubject>, CollaboratorError>;

    async fn fetch_subject_details(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, SubjectDetails>, CollaboratorError>;
}

/// Account service lookup by external identifier.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// `Ok(None)` when no account exists for the identifier.
    async fn resolve_by_external_id(
        &self,
        org_id: &str,
        external_id: &str,
    ) -> Result<Option<DirectoryAccount>, CollaboratorError>;
}
