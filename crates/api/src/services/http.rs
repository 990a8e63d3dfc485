//! Shared plumbing for the outbound HTTP clients.

use std::time::Duration;

use domain::CollaboratorError;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;

/// Largest error body kept for logs and error messages.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_client(timeout_ms: u64) -> Result<Client, CollaboratorError> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| CollaboratorError::Transport(format!("Failed to build HTTP client: {}", e)))
}

/// Appends percent-encoded path segments to `base_url`.
pub(crate) fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url, CollaboratorError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| CollaboratorError::Transport(format!("Invalid base URL {}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| CollaboratorError::Transport(format!("Invalid base URL {}", base_url)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) fn transport_error(err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Transport("Request timed out".to_string())
    } else {
        CollaboratorError::Transport(err.to_string())
    }
}

/// Fails with [`CollaboratorError::Status`] on a non-2xx response.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, CollaboratorError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(CollaboratorError::Status {
        status: status.as_u16(),
        body,
    })
}

pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, CollaboratorError> {
    response
        .json::<T>()
        .await
        .map_err(|e| CollaboratorError::Decode(e.to_string()))
}

/// Label for the outcome of an outbound call.
pub(crate) fn outcome<T>(result: &Result<T, CollaboratorError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(CollaboratorError::Status { .. }) => "status",
        Err(CollaboratorError::Decode(_)) => "decode",
        Err(_) => "transport",
    }
}
