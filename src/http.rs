//! Shared reqwest plumbing for the engine, host and telemetry store clients.

use crate::error::ClientError;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Build a client whose requests never outlive `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Transport(format!("Failed to build HTTP client: {}", e)))
}

/// Join a base URL and an absolute endpoint path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-2xx response into `ClientError::Server`, keeping the body text.
pub async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Server {
        status: status.as_u16(),
        body,
    })
}

/// Send a prepared request and decode a JSON body.
pub async fn send_json<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T, ClientError> {
    let response = request.send().await?;
    let response = expect_success(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Send a prepared request, only checking the status.
pub async fn send_unit(request: reqwest::RequestBuilder) -> Result<(), ClientError> {
    let response = request.send().await?;
    expect_success(response).await?;
    Ok(())
}
