//! HTTP client for the account service.

use async_trait::async_trait;
use domain::models::DirectoryAccount;
use domain::services::AccountDirectory;
use domain::CollaboratorError;
use metrics::counter;
use reqwest::{Client, StatusCode};

use super::http::{build_client, decode_json, endpoint, ensure_success, outcome, transport_error};
use crate::config::CoreConfig;

/// Header carrying the service API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";

/// Resolves accounts by external identifier.
#[derive(Clone)]
pub struct CoreAccountsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl CoreAccountsClient {
    pub fn new(config: &CoreConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(config.request_timeout_ms)?,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn lookup(
        &self,
        org_id: &str,
        external_id: &str,
    ) -> Result<Option<DirectoryAccount>, CollaboratorError> {
        let url = endpoint(&self.base_url, &["accounts"])?;
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("org_id", org_id), ("external_id", external_id)])
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let account = decode_json(ensure_success(response).await?).await?;
        Ok(Some(account))
    }
}

#[async_trait]
impl AccountDirectory for CoreAccountsClient {
    async fn resolve_by_external_id(
        &self,
        org_id: &str,
        external_id: &str,
    ) -> Result<Option<DirectoryAccount>, CollaboratorError> {
        let result = self.lookup(org_id, external_id).await;
        counter!(
            "core_requests_total",
            "operation" => "resolve_account",
            "outcome" => outcome(&result)
        )
        .increment(1);
        result
    }
}
