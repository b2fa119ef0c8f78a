// SPDX-License-Identifier: MIT
//! HTTP client for the remote execution provider.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SandboxConfig;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox credentials not configured")]
    Credentials,
    #[error("code execution timeout ({0}ms limit exceeded)")]
    Timeout(u64),
    #[error("sandbox API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("sandbox request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    script: &'a str,
    language: &'a str,
    version_index: &'a str,
}

/// Provider response. `status_code` is the provider's process exit status,
/// not the HTTP status.
#[derive(Debug, Deserialize)]
pub struct ExecuteResponse {
    #[serde(default)]
    pub output: String,
    #[serde(rename = "statusCode", default)]
    pub status_code: i64,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(rename = "cpuTime", default)]
    pub cpu_time: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct SandboxClient {
    http: reqwest::Client,
    config: SandboxConfig,
}

impl SandboxClient {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Submit a script for execution. The timeout is terminal — a slow call
    /// is never retried, so a submission can't tie up the caller twice.
    pub async fn execute(&self, script: &str) -> Result<ExecuteResponse, SandboxError> {
        let (client_id, client_secret) = match (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
        ) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => (id, secret),
            _ => return Err(SandboxError::Credentials),
        };

        let request = ExecuteRequest {
            client_id,
            client_secret,
            script,
            language: &self.config.language,
            version_index: &self.config.version_index,
        };

        debug!(
            endpoint = %self.config.endpoint,
            script_bytes = script.len(),
            "submitting script to sandbox"
        );

        let send = self.http.post(&self.config.endpoint).json(&request).send();
        let response = tokio::time::timeout(Duration::from_millis(self.config.timeout_ms), send)
            .await
            .map_err(|_| {
                warn!(timeout_ms = self.config.timeout_ms, "sandbox call timed out");
                SandboxError::Timeout(self.config.timeout_ms)
            })??;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::Api { status, body });
        }

        Ok(response.json::<ExecuteResponse>().await?)
    }
}
