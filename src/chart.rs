//! Chart resolution and dependency checks
//!
//! [`ChartResolver`] turns a chart reference (local path, cached chart name or
//! repository chart + version constraint) into a local path the release
//! service can install from.

pub mod provenance;
pub mod repo;

use crate::transport::{TlsFiles, TransportError};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use serde::Deserialize;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub use repo::{select_version, RepoIndex};

/// Version constraint used by `--devel`
pub const DEVEL_CONSTRAINT: &str = ">0.0.0-0";

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("path {0:?} not found")]
    PathNotFound(String),

    #[error("cannot verify a directory")]
    VerifyDirectory,

    #[error("failed to download {chart:?} (hint: running `helm repo update` may help)")]
    NotDownloadable { chart: String },

    #[error("chart {chart:?} matching {constraint} not found in {repo} index")]
    VersionNotFound {
        chart: String,
        constraint: String,
        repo: String,
    },

    #[error("improper constraint: {0}")]
    InvalidConstraint(String),

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("invalid repository index {url}: {message}")]
    InvalidIndex { url: String, message: String },

    #[error("provenance verification failed: {0}")]
    Provenance(String),

    #[error("cannot verify {0}: signature verification unsupported")]
    SignatureUnsupported(String),

    #[error("cannot load chart {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("cannot load requirements: {0}")]
    Requirements(String),

    #[error("found in requirements.yaml, but missing in charts/ directory: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    #[error("chart io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Where to find the chart for a rollout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartReference {
    /// Chart path, archive path or chart name
    pub name: String,
    /// Version constraint (empty: latest stable)
    pub version: Option<String>,
    /// Repository URL to fetch the chart from
    pub repo_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Require provenance verification
    pub verify: bool,
    pub keyring: PathBuf,
}

/// Locates chart artifacts for the rollout driver
///
/// Production code uses `LocalChartResolver`.
/// Tests use `MockChartResolver` which returns a fixed path.
#[async_trait]
pub trait ChartResolver: Send + Sync {
    /// Resolve a chart reference into a local path
    async fn resolve(&self, chart: &ChartReference, tls: &TlsFiles) -> Result<PathBuf, ChartError>;

    /// Check that every declared dependency is vendored in `charts/`
    ///
    /// A chart without `requirements.yaml` has nothing to check.
    fn check_dependencies(&self, chart_path: &Path) -> Result<(), ChartError> {
        check_dependencies(chart_path)
    }
}

/// Resolver backed by the local filesystem and chart repositories
pub struct LocalChartResolver {
    repository_dir: PathBuf,
    archive_dir: PathBuf,
}

impl LocalChartResolver {
    pub fn new(repository_dir: PathBuf, archive_dir: PathBuf) -> Self {
        LocalChartResolver {
            repository_dir,
            archive_dir,
        }
    }

    /// Build a resolver rooted at the configured home directory
    pub fn from_settings(settings: &crate::config::Settings) -> Self {
        Self::new(settings.repository_dir(), settings.archive_dir())
    }
}

#[async_trait]
impl ChartResolver for LocalChartResolver {
    async fn resolve(&self, chart: &ChartReference, tls: &TlsFiles) -> Result<PathBuf, ChartError> {
        let name = chart.name.trim();
        let version = chart.version.as_deref().map(str::trim).unwrap_or("");

        let local = Path::new(name);
        if local.exists() {
            let path = std::path::absolute(local).map_err(|source| ChartError::Io {
                path: local.to_path_buf(),
                source,
            })?;
            if chart.verify {
                if path.is_dir() {
                    return Err(ChartError::VerifyDirectory);
                }
                provenance::verify_chart(&path, &chart.keyring)?;
            }
            debug!(chart = %path.display(), "Using local chart");
            return Ok(path);
        }

        if local.is_absolute() || name.starts_with('.') {
            return Err(ChartError::PathNotFound(name.to_string()));
        }

        let cached = self.repository_dir.join(name);
        if cached.exists() {
            debug!(chart = %cached.display(), "Using chart from repository cache");
            return Ok(cached);
        }

        let Some(repo_url) = chart.repo_url.as_deref().filter(|u| !u.is_empty()) else {
            return Err(ChartError::NotDownloadable {
                chart: name.to_string(),
            });
        };

        let fetcher = repo::RepoFetcher::new(
            repo_url,
            chart.username.as_deref(),
            chart.password.as_deref(),
            tls,
        )?;
        let index = fetcher.index().await?;
        let entry = select_version(&index, name, version).map_err(|e| match e {
            ChartError::VersionNotFound {
                chart, constraint, ..
            } => ChartError::VersionNotFound {
                chart,
                constraint,
                repo: repo_url.to_string(),
            },
            other => other,
        })?;

        info!(chart = %name, version = %entry.version, repo = %repo_url, "Downloading chart");
        let archive = fetcher
            .download(&entry, &self.archive_dir, chart.verify)
            .await?;
        if chart.verify {
            provenance::verify_chart(&archive, &chart.keyring)?;
        }
        Ok(archive)
    }
}

#[derive(Debug, Deserialize)]
struct ChartFile {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Requirements {
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

#[derive(Debug, Deserialize)]
struct Dependency {
    name: String,
}

/// Check a chart's declared dependencies against its `charts/` directory
///
/// Works on chart directories and packaged `.tgz` archives. Both must carry a
/// `Chart.yaml`; a chart without `requirements.yaml` has nothing to check.
pub fn check_dependencies(chart_path: &Path) -> Result<(), ChartError> {
    if chart_path.is_dir() {
        check_directory_dependencies(chart_path)
    } else if chart_path.is_file() {
        check_archive_dependencies(chart_path)
    } else {
        Err(ChartError::Load {
            path: chart_path.to_path_buf(),
            message: "no such file or directory".to_string(),
        })
    }
}

fn check_directory_dependencies(chart_dir: &Path) -> Result<(), ChartError> {
    read_chart_file(&chart_dir.join("Chart.yaml")).map_err(|message| ChartError::Load {
        path: chart_dir.to_path_buf(),
        message,
    })?;

    let requirements = match std::fs::read_to_string(chart_dir.join("requirements.yaml")) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ChartError::Requirements(e.to_string())),
    };

    let vendored = vendored_charts(&chart_dir.join("charts"))?;
    missing_dependencies(&requirements, &vendored)
}

/// Same check as for directories, reading entries straight out of the archive
///
/// Entries are laid out as `<chart>/Chart.yaml`, `<chart>/requirements.yaml`
/// and `<chart>/charts/...`.
fn check_archive_dependencies(archive_path: &Path) -> Result<(), ChartError> {
    let io_err = |source: std::io::Error| ChartError::Io {
        path: archive_path.to_path_buf(),
        source,
    };
    let file = std::fs::File::open(archive_path).map_err(io_err)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let mut chart_file = None;
    let mut requirements = None;
    let mut vendored = Vec::new();
    for entry in archive.entries().map_err(io_err)? {
        let mut entry = entry.map_err(io_err)?;
        let owned: Vec<String> = entry
            .path()
            .map_err(io_err)?
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let parts: Vec<&str> = owned.iter().map(String::as_str).collect();

        match parts.as_slice() {
            [_, "Chart.yaml"] => chart_file = Some(read_entry(&mut entry).map_err(io_err)?),
            [_, "requirements.yaml"] => {
                requirements = Some(read_entry(&mut entry).map_err(io_err)?)
            }
            [_, "charts", _, "Chart.yaml"] => {
                let content = read_entry(&mut entry).map_err(io_err)?;
                if let Ok(chart) = serde_yaml::from_str::<ChartFile>(&content) {
                    vendored.push(Vendored::Directory(chart.name));
                }
            }
            [_, "charts", file] if file.ends_with(".tgz") => {
                vendored.push(Vendored::Archive(file.to_string()))
            }
            _ => {}
        }
    }

    let load_err = |message: String| ChartError::Load {
        path: archive_path.to_path_buf(),
        message,
    };
    let chart_file = chart_file.ok_or_else(|| load_err("Chart.yaml file is missing".to_string()))?;
    serde_yaml::from_str::<ChartFile>(&chart_file).map_err(|e| load_err(e.to_string()))?;

    match requirements {
        Some(requirements) => missing_dependencies(&requirements, &vendored),
        None => Ok(()),
    }
}

fn read_entry(entry: &mut impl Read) -> std::io::Result<String> {
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content)
}

fn missing_dependencies(requirements: &str, vendored: &[Vendored]) -> Result<(), ChartError> {
    let requirements = serde_yaml::from_str::<Option<Requirements>>(requirements)
        .map_err(|e| ChartError::Requirements(e.to_string()))?
        .unwrap_or_default();

    let missing: Vec<String> = requirements
        .dependencies
        .into_iter()
        .map(|d| d.name)
        .filter(|name| !vendored.iter().any(|v| v.satisfies(name)))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ChartError::MissingDependencies(missing))
    }
}

fn read_chart_file(path: &Path) -> Result<ChartFile, String> {
    let content = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_yaml::from_str(&content).map_err(|e| e.to_string())
}

enum Vendored {
    Directory(String),
    Archive(String),
}

impl Vendored {
    fn satisfies(&self, dependency: &str) -> bool {
        match self {
            Vendored::Directory(name) => name == dependency,
            Vendored::Archive(file) => file.starts_with(&format!("{}-", dependency)),
        }
    }
}

fn vendored_charts(charts_dir: &Path) -> Result<Vec<Vendored>, ChartError> {
    let entries = match std::fs::read_dir(charts_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(source) => {
            return Err(ChartError::Io {
                path: charts_dir.to_path_buf(),
                source,
            })
        }
    };

    let mut vendored = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ChartError::Io {
            path: charts_dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();
        if path.is_dir() {
            if let Ok(chart) = read_chart_file(&path.join("Chart.yaml")) {
                vendored.push(Vendored::Directory(chart.name));
            }
        } else if file_name.ends_with(".tgz") {
            vendored.push(Vendored::Archive(file_name));
        }
    }
    Ok(vendored)
}

/// Resolver double returning a fixed path
#[cfg(test)]
pub struct MockChartResolver {
    path: PathBuf,
    fail: bool,
}

#[cfg(test)]
impl MockChartResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MockChartResolver {
            path: path.into(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        MockChartResolver {
            path: PathBuf::new(),
            fail: true,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ChartResolver for MockChartResolver {
    async fn resolve(
        &self,
        chart: &ChartReference,
        _tls: &TlsFiles,
    ) -> Result<PathBuf, ChartError> {
        if self.fail {
            return Err(ChartError::NotDownloadable {
                chart: chart.name.clone(),
            });
        }
        Ok(self.path.clone())
    }

    fn check_dependencies(&self, _chart_path: &Path) -> Result<(), ChartError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "chart_test.rs"]
mod tests;
