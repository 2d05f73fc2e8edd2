//! HTTP(S) implementation of the release client
//!
//! Endpoints on the release service:
//! - `GET  /v1/releases/{name}/content?version=N`
//! - `POST /v1/releases/{name}/update`
//! - `GET  /v1/releases/{name}/status`

use super::{Release, ReleaseClient, ReleaseError, StatusReport, UpdateOptions};
use crate::config::Settings;
use crate::transport::{build_http_client, TlsFiles, TransportError};
use crate::values::to_yaml;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Body of an update request
#[derive(Debug, Serialize)]
struct UpdateReleaseRequest<'a> {
    name: &'a str,
    chart_path: String,
    /// Value overrides rendered as YAML
    values: String,
    dry_run: bool,
    recreate: bool,
    force: bool,
    disable_hooks: bool,
    timeout: u64,
    reset_values: bool,
    reuse_values: bool,
    wait: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct UpdateReleaseResponse {
    release: Release,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Release client speaking JSON over HTTP(S)
pub struct HttpReleaseClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpReleaseClient {
    /// Build a client from connection settings
    ///
    /// Uses TLS client certificates from `settings.tls` when TLS is enabled;
    /// otherwise they are ignored. Server certificates are only verified when
    /// `tls.verify` is set.
    pub fn new(settings: &Settings) -> Result<Self, TransportError> {
        let mut base_url = settings.host.trim_end_matches('/').to_string();
        if !base_url.contains("://") {
            let scheme = if settings.tls.is_enabled() { "https" } else { "http" };
            base_url = format!("{}://{}", scheme, base_url);
        }
        let insecure = settings.tls.is_enabled() && !settings.tls.verify;
        let files = if settings.tls.is_enabled() {
            TlsFiles::from(&settings.tls)
        } else {
            TlsFiles::default()
        };
        let client = build_http_client(&files, insecure)?;
        Ok(HttpReleaseClient { base_url, client })
    }

    fn url(&self, name: &str, action: &str) -> String {
        format!("{}/v1/releases/{}/{}", self.base_url, name, action)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        name: &str,
        response: reqwest::Response,
    ) -> Result<T, ReleaseError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ReleaseError::NotFound(name.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| {
                    if body.trim().is_empty() {
                        status.to_string()
                    } else {
                        body.trim().to_string()
                    }
                });
            return Err(ReleaseError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ReleaseError::Decode(e.to_string()))
    }
}

fn connection_error(e: reqwest::Error) -> ReleaseError {
    ReleaseError::Connection(e.to_string())
}

#[async_trait]
impl ReleaseClient for HttpReleaseClient {
    async fn release_content(&self, name: &str, version: i32) -> Result<Release, ReleaseError> {
        debug!(release = %name, version, "Fetching release content");
        let response = self
            .client
            .get(self.url(name, "content"))
            .query(&[("version", version)])
            .send()
            .await
            .map_err(connection_error)?;
        Self::decode(name, response).await
    }

    async fn update_release(
        &self,
        name: &str,
        chart_path: &Path,
        options: UpdateOptions,
    ) -> Result<Release, ReleaseError> {
        let values = to_yaml(&options.values).map_err(|e| ReleaseError::Encode(e.to_string()))?;
        let body = UpdateReleaseRequest {
            name,
            chart_path: chart_path.display().to_string(),
            values,
            dry_run: options.dry_run,
            recreate: options.recreate,
            force: options.force,
            disable_hooks: options.disable_hooks,
            timeout: options.timeout_secs,
            reset_values: options.reset_values,
            reuse_values: options.reuse_values,
            wait: options.wait,
            description: options.description.as_deref(),
        };

        debug!(release = %name, reuse_values = options.reuse_values, "Updating release");
        // The service may block for the whole operation timeout when waiting on resources
        let response = self
            .client
            .post(self.url(name, "update"))
            .timeout(Duration::from_secs(options.timeout_secs.saturating_add(30)))
            .json(&body)
            .send()
            .await
            .map_err(connection_error)?;
        let decoded: UpdateReleaseResponse = Self::decode(name, response).await?;
        Ok(decoded.release)
    }

    async fn release_status(&self, name: &str) -> Result<StatusReport, ReleaseError> {
        debug!(release = %name, "Fetching release status");
        let response = self
            .client
            .get(self.url(name, "status"))
            .send()
            .await
            .map_err(connection_error)?;
        Self::decode(name, response).await
    }
}

#[cfg(test)]
#[path = "http_test.rs"]
mod tests;
