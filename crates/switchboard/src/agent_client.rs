// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the upstream agent service.
//!
//! Speaks a small JSON API:
//! - `POST {base}/v1/dispatch` with `{"user_id", "text"}`, answered by `{"response"}`
//! - `POST {base}/v1/resources/{user_id}/attach` (409 = already attached, 404 = no handle)
//! - `DELETE {base}/v1/resources/{user_id}`
//!
//! Retries, timeouts and the circuit breaker live in the live dispatcher; this
//! client makes exactly one request per call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use switchboard_core::{AgentClient, SwitchboardError};
use tracing::debug;

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    user_id: i64,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    #[serde(default)]
    response: String,
}

/// [`AgentClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAgentClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAgentClient {
    /// Builds a client for `base_url` with a per-request transport timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SwitchboardError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SwitchboardError::Dispatch {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resource_url(&self, user_id: i64) -> String {
        format!("{}/v1/resources/{user_id}", self.base_url)
    }
}

fn transport_error(what: &str, e: reqwest::Error) -> SwitchboardError {
    SwitchboardError::Dispatch {
        message: format!("{what} request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// Transient statuses stay retryable; any other refusal is final.
async fn status_error(what: &str, response: reqwest::Response) -> SwitchboardError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if is_transient_status(status) {
        SwitchboardError::dispatch(format!("{what} returned {status}: {body}"))
    } else {
        SwitchboardError::AgentRejected {
            status: status.as_u16(),
            message: format!("{what} returned {status}: {body}"),
        }
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn dispatch(&self, user_id: i64, formatted_text: &str) -> Result<String, SwitchboardError> {
        let response = self
            .client
            .post(format!("{}/v1/dispatch", self.base_url))
            .json(&DispatchRequest {
                user_id,
                text: formatted_text,
            })
            .send()
            .await
            .map_err(|e| transport_error("dispatch", e))?;

        if !response.status().is_success() {
            return Err(status_error("dispatch", response).await);
        }

        let body: DispatchResponse = response.json().await.map_err(|e| SwitchboardError::Dispatch {
            message: format!("malformed dispatch response: {e}"),
            source: Some(Box::new(e)),
        })?;
        debug!(user_id, len = body.response.len(), "agent replied");
        Ok(body.response)
    }

    async fn attach(&self, user_id: i64) -> Result<(), SwitchboardError> {
        let response = self
            .client
            .post(format!("{}/attach", self.resource_url(user_id)))
            .send()
            .await
            .map_err(|e| transport_error("attach", e))?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(SwitchboardError::AlreadyAttached { user_id }),
            StatusCode::NOT_FOUND => Err(SwitchboardError::not_found("resource handle", user_id)),
            _ => Err(status_error("attach", response).await),
        }
    }

    async fn detach(&self, user_id: i64) -> Result<(), SwitchboardError> {
        let response = self
            .client
            .delete(self.resource_url(user_id))
            .send()
            .await
            .map_err(|e| transport_error("detach", e))?;

        // Nothing attached is as good as detached.
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(status_error("detach", response).await)
    }
}
