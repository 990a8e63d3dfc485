//! In-process roster and account sources.
//!
//! Used by tests and by local runs with the directory integration turned off.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::collaborators::{AccountDirectory, RosterSource, RosterSubject, SubjectDetails};
use crate::error::CollaboratorError;
use crate::models::DirectoryAccount;

/// Roster source backed by a map of stem to subjects.
#[derive(Default)]
pub struct StaticRosterSource {
    rosters: RwLock<HashMap<String, Vec<RosterSubject>>>,
    details: RwLock<HashMap<String, SubjectDetails>>,
    failing: RwLock<bool>,
    delay: RwLock<Option<Duration>>,
    fetches: AtomicUsize,
}

impl StaticRosterSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the roster of `stem` with subjects of the given source type.
    pub async fn set_roster(&self, stem: &str, source_id: &str, ids: &[&str]) {
        let subjects = ids
            .iter()
            .map(|id| RosterSubject {
                id: id.to_string(),
                source_id: source_id.to_string(),
            })
            .collect();
        self.rosters.write().await.insert(stem.to_string(), subjects);
    }

    pub async fn push_subject(&self, stem: &str, subject: RosterSubject) {
        self.rosters
            .write()
            .await
            .entry(stem.to_string())
            .or_default()
            .push(subject);
    }

    pub async fn set_details(&self, id: &str, name: Option<&str>, email: Option<&str>) {
        self.details.write().await.insert(
            id.to_string(),
            SubjectDetails {
                name: name.map(str::to_string),
                email: email.map(str::to_string),
            },
        );
    }

    /// Makes every fetch fail with a transport error.
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    /// Delays every roster fetch.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RosterSource for StaticRosterSource {
    async fn fetch_group_members(&self, stem: &str) -> Result<Vec<RosterSubject>, CollaboratorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.failing.read().await {
            return Err(CollaboratorError::Transport("directory unreachable".to_string()));
        }
        Ok(self
            .rosters
            .read()
            .await
            .get(stem)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_subject_details(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, SubjectDetails>, CollaboratorError> {
        if *self.failing.read().await {
            return Err(CollaboratorError::Transport("directory unreachable".to_string()));
        }
        let details = self.details.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| details.get(id).map(|d| (id.clone(), d.clone())))
            .collect())
    }
}

/// Account directory backed by a map of external identifier to account.
#[derive(Default)]
pub struct StaticAccountDirectory {
    accounts: RwLock<HashMap<String, DirectoryAccount>>,
    failing: RwLock<bool>,
    delay: RwLock<Option<Duration>>,
}

impl StaticAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: DirectoryAccount) {
        if let Some(external_id) = account.external_id.clone() {
            self.accounts.write().await.insert(external_id, account);
        }
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    /// Delays every lookup.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }
}

#[async_trait]
impl AccountDirectory for StaticAccountDirectory {
    async fn resolve_by_external_id(
        &self,
        _org_id: &str,
        external_id: &str,
    ) -> Result<Option<DirectoryAccount>, CollaboratorError> {
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.failing.read().await {
            return Err(CollaboratorError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(self.accounts.read().await.get(external_id).cloned())
    }
}
