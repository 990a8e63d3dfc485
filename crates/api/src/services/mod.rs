//! Outbound service clients.

mod http;

pub mod authman;
pub mod accounts;
pub mod notifications;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::models::DirectoryAccount;
use domain::services::{
    AccountDirectory, LogNotificationDispatcher, NotificationDispatcher, RosterSource,
    RosterSubject, SubjectDetails,
};
use domain::CollaboratorError;

pub use authman::AuthmanClient;
pub use accounts::CoreAccountsClient;
pub use notifications::NotificationsClient;

use crate::config::Config;

/// Stand-in used while directory synchronization is switched off.
#[derive(Debug, Clone, Default)]
pub struct DisabledDirectory;

#[async_trait]
impl RosterSource for DisabledDirectory {
    async fn fetch_group_members(&self, _stem: &str) -> Result<Vec<RosterSubject>, CollaboratorError> {
        Err(CollaboratorError::Disabled)
    }

    async fn fetch_subject_details(
        &self,
        _ids: &[String],
    ) -> Result<HashMap<String, SubjectDetails>, CollaboratorError> {
        Err(CollaboratorError::Disabled)
    }
}

#[async_trait]
impl AccountDirectory for DisabledDirectory {
    async fn resolve_by_external_id(
        &self,
        _org_id: &str,
        _external_id: &str,
    ) -> Result<Option<DirectoryAccount>, CollaboratorError> {
        Err(CollaboratorError::Disabled)
    }
}

/// The external services the API talks to.
pub struct Collaborators {
    pub roster: Arc<dyn RosterSource>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
}

impl Collaborators {
    /// Builds HTTP clients for every enabled service.
    pub fn from_config(config: &Config) -> Result<Self, CollaboratorError> {
        let (roster, accounts): (Arc<dyn RosterSource>, Arc<dyn AccountDirectory>) =
            if config.authman.enabled {
                (
                    Arc::new(AuthmanClient::new(&config.authman)?),
                    Arc::new(CoreAccountsClient::new(&config.core)?),
                )
            } else {
                (Arc::new(DisabledDirectory), Arc::new(DisabledDirectory))
            };

        let dispatcher: Arc<dyn NotificationDispatcher> = if config.notifications.enabled {
            Arc::new(NotificationsClient::new(&config.notifications)?)
        } else {
            Arc::new(LogNotificationDispatcher::new())
        };

        Ok(Self {
            roster,
            accounts,
            dispatcher,
        })
    }
}
