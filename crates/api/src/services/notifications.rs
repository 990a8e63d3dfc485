//! HTTP client for the notification delivery service.

use async_trait::async_trait;
use domain::services::{Notification, NotificationDispatcher};
use domain::CollaboratorError;
use reqwest::Client;

use super::accounts::API_KEY_HEADER;
use super::http::{build_client, endpoint, ensure_success, transport_error};
use crate::config::NotificationsConfig;

#[derive(Clone)]
pub struct NotificationsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NotificationsClient {
    pub fn new(config: &NotificationsConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(config.request_timeout_ms)?,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for NotificationsClient {
    async fn send(&self, notification: &Notification) -> Result<(), CollaboratorError> {
        let url = endpoint(&self.base_url, &["message"])?;
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(notification)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await?;
        Ok(())
    }
}
