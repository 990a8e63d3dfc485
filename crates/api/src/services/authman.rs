//! HTTP client for the directory service that owns managed-group rosters.

use std::collections::HashMap;

use async_trait::async_trait;
use domain::services::{RosterSource, RosterSubject, SubjectDetails};
use domain::CollaboratorError;
use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{build_client, decode_json, endpoint, ensure_success, outcome, transport_error};
use crate::config::AuthmanConfig;

#[derive(Debug, Deserialize)]
struct MembersResponse {
    #[serde(default)]
    subjects: Vec<RosterSubject>,
}

#[derive(Debug, Serialize)]
struct SubjectsRequest<'a> {
    ids: &'a [String],
}

#[derive(Debug, Deserialize)]
struct SubjectEntry {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubjectsResponse {
    #[serde(default)]
    subjects: Vec<SubjectEntry>,
}

/// Directory client using HTTP basic authentication.
#[derive(Clone)]
pub struct AuthmanClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl AuthmanClient {
    pub fn new(config: &AuthmanConfig) -> Result<Self, CollaboratorError> {
        Ok(Self {
            client: build_client(config.request_timeout_ms)?,
            base_url: config.base_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn get_members(&self, stem: &str) -> Result<Vec<RosterSubject>, CollaboratorError> {
        let url = endpoint(&self.base_url, &["groups", stem, "members"])?;
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(transport_error)?;
        let body: MembersResponse = decode_json(ensure_success(response).await?).await?;
        Ok(body.subjects)
    }

    async fn post_subjects(&self, ids: &[String]) -> Result<Vec<SubjectEntry>, CollaboratorError> {
        let url = endpoint(&self.base_url, &["subjects"])?;
        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&SubjectsRequest { ids })
            .send()
            .await
            .map_err(transport_error)?;
        let body: SubjectsResponse = decode_json(ensure_success(response).await?).await?;
        Ok(body.subjects)
    }
}

#[async_trait]
impl RosterSource for AuthmanClient {
    async fn fetch_group_members(&self, stem: &str) -> Result<Vec<RosterSubject>, CollaboratorError> {
        let result = self.get_members(stem).await;
        counter!(
            "authman_requests_total",
            "operation" => "group_members",
            "outcome" => outcome(&result)
        )
        .increment(1);
        if let Ok(subjects) = &result {
            debug!(stem, count = subjects.len(), "Fetched directory roster");
        }
        result
    }

    async fn fetch_subject_details(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, SubjectDetails>, CollaboratorError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let result = self.post_subjects(ids).await;
        counter!(
            "authman_requests_total",
            "operation" => "subject_details",
            "outcome" => outcome(&result)
        )
        .increment(1);

        Ok(result?
            .into_iter()
            .map(|entry| {
                (
                    entry.id,
                    SubjectDetails {
                        name: entry.name,
                        email: entry.email,
                    },
                )
            })
            .collect())
    }
}
