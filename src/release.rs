//! Release service contract
//!
//! The rollout driver never stores anything itself: release content, updates and
//! status all go through [`ReleaseClient`]. `HttpReleaseClient` talks to the
//! release service over HTTP(S); tests use `MockReleaseClient`.

pub mod http;
pub mod status;

use crate::values::Values;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use http::HttpReleaseClient;

/// Per-operation timeout used when the caller does not pass one
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("release: {0:?} not found")]
    NotFound(String),

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("connection to release service failed: {0}")]
    Connection(String),

    #[error("invalid response from release service: {0}")]
    Decode(String),

    #[error("cannot encode request: {0}")]
    Encode(String),
}

/// Lifecycle state of a release revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    #[default]
    Unknown,
    Deployed,
    Deleted,
    Superseded,
    Failed,
    Deleting,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::Deployed => "DEPLOYED",
            StatusCode::Deleted => "DELETED",
            StatusCode::Superseded => "SUPERSEDED",
            StatusCode::Failed => "FAILED",
            StatusCode::Deleting => "DELETING",
            StatusCode::PendingInstall => "PENDING_INSTALL",
            StatusCode::PendingUpgrade => "PENDING_UPGRADE",
            StatusCode::PendingRollback => "PENDING_ROLLBACK",
        };
        f.write_str(s)
    }
}

/// Raw YAML configuration block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartMetadata {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "appVersion", default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

/// Chart as stored with a release: metadata plus default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chart {
    pub metadata: ChartMetadata,
    #[serde(default)]
    pub values: Config,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub status: StatusCode,
    #[serde(rename = "firstDeployed", default, skip_serializing_if = "Option::is_none")]
    pub first_deployed: Option<DateTime<Utc>>,
    #[serde(rename = "lastDeployed", default, skip_serializing_if = "Option::is_none")]
    pub last_deployed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: String,
}

/// One revision of a named release
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub version: i32,
    #[serde(default)]
    pub info: ReleaseInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<Chart>,
    /// User-supplied values of this revision
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub manifest: String,
}

/// Status of the deployed revision, as printed after a rollout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub info: ReleaseInfo,
    /// Pre-rendered resource table
    #[serde(default)]
    pub resources: String,
    #[serde(default)]
    pub notes: String,
}

/// Options for a single release update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOptions {
    /// Merged value overrides for this update
    pub values: Values,
    pub dry_run: bool,
    pub recreate: bool,
    pub force: bool,
    pub disable_hooks: bool,
    pub timeout_secs: u64,
    pub reset_values: bool,
    pub reuse_values: bool,
    pub wait: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            values: Values::new(),
            dry_run: false,
            recreate: false,
            force: false,
            disable_hooks: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            reset_values: false,
            reuse_values: false,
            wait: false,
            description: None,
        }
    }
}

impl UpdateOptions {
    /// Update that keeps the previous revision's values and layers `values` on top
    pub fn reusing(values: Values) -> Self {
        UpdateOptions {
            values,
            reuse_values: true,
            ..Default::default()
        }
    }
}

/// Operations the rollout needs from the release service
///
/// Production code uses `HttpReleaseClient`.
/// Tests use `MockReleaseClient` which records calls in memory for assertions.
#[async_trait]
pub trait ReleaseClient: Send + Sync {
    /// Fetch a release revision (`version == 0` selects the latest)
    async fn release_content(&self, name: &str, version: i32) -> Result<Release, ReleaseError>;

    /// Upgrade a release to the chart at `chart_path` with the given options
    async fn update_release(
        &self,
        name: &str,
        chart_path: &Path,
        options: UpdateOptions,
    ) -> Result<Release, ReleaseError>;

    /// Fetch the status of the deployed revision
    async fn release_status(&self, name: &str) -> Result<StatusReport, ReleaseError>;
}

/// A call seen by `MockReleaseClient`
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Content { name: String, version: i32 },
    Update {
        name: String,
        chart_path: std::path::PathBuf,
        options: UpdateOptions,
    },
    Status { name: String },
}

/// Mock release client for testing - serves canned responses, records calls
#[cfg(test)]
#[derive(Default)]
pub struct MockReleaseClient {
    content: Option<Release>,
    status: Option<StatusReport>,
    /// 1-based index of the update call that should fail
    fail_update_at: Option<usize>,
    calls: std::sync::Mutex<Vec<RecordedCall>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockReleaseClient {
    pub fn new(content: Release) -> Self {
        let status = StatusReport {
            name: content.name.clone(),
            namespace: content.namespace.clone(),
            info: ReleaseInfo {
                status: StatusCode::Deployed,
                ..Default::default()
            },
            ..Default::default()
        };
        MockReleaseClient {
            content: Some(content),
            status: Some(status),
            ..Default::default()
        }
    }

    /// Client that has no release at all
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fail_update_at(mut self, call: usize) -> Self {
        self.fail_update_at = Some(call);
        self
    }

    pub fn without_status(mut self) -> Self {
        self.status = None;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Options of every update call, in order
    pub fn updates(&self) -> Vec<UpdateOptions> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RecordedCall::Update { options, .. } => Some(options),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl ReleaseClient for MockReleaseClient {
    async fn release_content(&self, name: &str, version: i32) -> Result<Release, ReleaseError> {
        self.calls.lock().unwrap().push(RecordedCall::Content {
            name: name.to_string(),
            version,
        });
        self.content
            .clone()
            .filter(|r| r.name == name)
            .ok_or_else(|| ReleaseError::NotFound(name.to_string()))
    }

    async fn update_release(
        &self,
        name: &str,
        chart_path: &Path,
        options: UpdateOptions,
    ) -> Result<Release, ReleaseError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(RecordedCall::Update {
            name: name.to_string(),
            chart_path: chart_path.to_path_buf(),
            options,
        });
        let update_count = calls
            .iter()
            .filter(|c| matches!(c, RecordedCall::Update { .. }))
            .count();
        if self.fail_update_at == Some(update_count) {
            return Err(ReleaseError::Rejected {
                status: 500,
                message: "timed out waiting for the condition".to_string(),
            });
        }
        let mut release = self.content.clone().unwrap_or_default();
        release.version += update_count as i32;
        Ok(release)
    }

    async fn release_status(&self, name: &str) -> Result<StatusReport, ReleaseError> {
        self.calls.lock().unwrap().push(RecordedCall::Status {
            name: name.to_string(),
        });
        self.status
            .clone()
            .ok_or_else(|| ReleaseError::Connection("status unavailable".to_string()))
    }
}
