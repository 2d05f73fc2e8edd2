//! Chart repository index lookup and archive download

use super::ChartError;
use crate::transport::{build_http_client, TlsFiles};
use semver::{Version, VersionReq};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `index.yaml` of a chart repository
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoIndex {
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartVersion>>,
}

/// One published version of a chart
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChartVersion {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

impl RepoIndex {
    pub fn from_yaml(url: &str, content: &str) -> Result<Self, ChartError> {
        serde_yaml::from_str(content).map_err(|e| ChartError::InvalidIndex {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Pick the highest version of `chart` matching `constraint`
///
/// An empty constraint selects the latest stable version. A constraint that
/// itself names a pre-release (such as `>0.0.0-0`) also admits pre-releases.
pub fn select_version(
    index: &RepoIndex,
    chart: &str,
    constraint: &str,
) -> Result<ChartVersion, ChartError> {
    let not_found = || ChartError::VersionNotFound {
        chart: chart.to_string(),
        constraint: if constraint.is_empty() {
            "latest".to_string()
        } else {
            constraint.to_string()
        },
        repo: String::new(),
    };

    let req = if constraint.is_empty() {
        None
    } else {
        Some(
            VersionReq::parse(constraint)
                .map_err(|e| ChartError::InvalidConstraint(format!("{}: {}", constraint, e)))?,
        )
    };
    let allow_pre = req
        .as_ref()
        .map(|r| r.comparators.iter().any(|c| !c.pre.is_empty()))
        .unwrap_or(false);

    let versions = index.entries.get(chart).ok_or_else(not_found)?;
    versions
        .iter()
        .filter_map(|entry| {
            Version::parse(entry.version.trim_start_matches('v'))
                .ok()
                .map(|v| (v, entry))
        })
        .filter(|(v, _)| match &req {
            None => v.pre.is_empty(),
            Some(req) if allow_pre => {
                req.matches(v) || {
                    let mut release = v.clone();
                    release.pre = semver::Prerelease::EMPTY;
                    req.matches(&release)
                }
            }
            Some(req) => req.matches(v),
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, entry)| entry.clone())
        .ok_or_else(not_found)
}

/// Resolve a possibly relative chart URL against the repository URL
pub fn absolute_url(repo_url: &str, chart_url: &str) -> String {
    if chart_url.contains("://") {
        chart_url.to_string()
    } else {
        format!(
            "{}/{}",
            repo_url.trim_end_matches('/'),
            chart_url.trim_start_matches('/')
        )
    }
}

pub(crate) struct RepoFetcher<'a> {
    repo_url: &'a str,
    username: Option<&'a str>,
    password: Option<&'a str>,
    client: reqwest::Client,
}

impl<'a> RepoFetcher<'a> {
    pub(crate) fn new(
        repo_url: &'a str,
        username: Option<&'a str>,
        password: Option<&'a str>,
        tls: &TlsFiles,
    ) -> Result<Self, ChartError> {
        Ok(RepoFetcher {
            repo_url,
            username,
            password,
            client: build_http_client(tls, false)?,
        })
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, ChartError> {
        let fetch_err = |e: reqwest::Error| ChartError::Fetch {
            url: url.to_string(),
            message: e.to_string(),
        };
        let mut request = self.client.get(url);
        if let Some(username) = self.username.filter(|u| !u.is_empty()) {
            request = request.basic_auth(username, self.password);
        }
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_err)?;
        Ok(response.bytes().await.map_err(fetch_err)?.to_vec())
    }

    pub(crate) async fn index(&self) -> Result<RepoIndex, ChartError> {
        let url = absolute_url(self.repo_url, "index.yaml");
        debug!(url = %url, "Fetching repository index");
        let body = self.get(&url).await?;
        RepoIndex::from_yaml(&url, &String::from_utf8_lossy(&body))
    }

    /// Download the archive (and provenance file when verifying) into `dest_dir`
    pub(crate) async fn download(
        &self,
        entry: &ChartVersion,
        dest_dir: &Path,
        with_provenance: bool,
    ) -> Result<PathBuf, ChartError> {
        let chart_url = entry
            .urls
            .first()
            .ok_or_else(|| ChartError::NotDownloadable {
                chart: entry.name.clone(),
            })?;
        let url = absolute_url(self.repo_url, chart_url);

        let file_name = url
            .rsplit('/')
            .next()
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}.tgz", entry.name, entry.version));

        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|source| ChartError::Io {
                path: dest_dir.to_path_buf(),
                source,
            })?;

        let archive = dest_dir.join(&file_name);
        let bytes = self.get(&url).await?;
        write_file(&archive, &bytes).await?;

        if with_provenance {
            let prov_bytes = self.get(&format!("{}.prov", url)).await?;
            write_file(&dest_dir.join(format!("{}.prov", file_name)), &prov_bytes).await?;
        }
        Ok(archive)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ChartError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| ChartError::Io {
            path: path.to_path_buf(),
            source,
        })
}
