//! Caller and directory account models.

use serde::{Deserialize, Serialize};

/// The authenticated caller, as decoded from the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Account {
    pub user_id: String,
    pub org_id: String,
    pub app_id: String,
    pub external_id: Option<String>,
    pub net_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    /// Administrative permission grants issued by the account service.
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Account {
    /// Returns true if the account holds the named permission grant.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// An account as returned by the account directory when looked up by external identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DirectoryAccount {
    pub user_id: String,
    pub external_id: Option<String>,
    pub net_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Identity fields mirrored onto a membership record.
///
/// Every field is optional; `GroupMembership::apply_identity_if_empty` only
/// copies values into fields that are currently empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberIdentity {
    pub user_id: Option<String>,
    pub external_id: Option<String>,
    pub net_id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl From<&Account> for MemberIdentity {
    fn from(account: &Account) -> Self {
        Self {
            user_id: Some(account.user_id.clone()),
            external_id: account.external_id.clone(),
            net_id: account.net_id.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            photo_url: None,
        }
    }
}

impl From<&DirectoryAccount> for MemberIdentity {
    fn from(account: &DirectoryAccount) -> Self {
        Self {
            user_id: Some(account.user_id.clone()),
            external_id: account.external_id.clone(),
            net_id: account.net_id.clone(),
            name: account.name.clone(),
            email: account.email.clone(),
            photo_url: None,
        }
    }
}
