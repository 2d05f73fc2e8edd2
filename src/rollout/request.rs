use crate::chart::ChartReference;
use crate::release::{UpdateOptions, DEFAULT_TIMEOUT_SECS};
use crate::transport::TlsFiles;
use crate::values::{ValueSources, Values};

/// Flags that apply to the deploy phase of a rollout
#[derive(Debug, Clone, PartialEq)]
pub struct DeployFlags {
    pub dry_run: bool,
    pub recreate: bool,
    pub force: bool,
    pub disable_hooks: bool,
    pub timeout_secs: u64,
    pub reset_values: bool,
    pub reuse_values: bool,
    pub wait: bool,
    pub description: Option<String>,
}

impl Default for DeployFlags {
    fn default() -> Self {
        DeployFlags {
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

impl DeployFlags {
    /// Update options for the deploy phase
    pub fn update_options(&self, values: Values) -> UpdateOptions {
        UpdateOptions {
            values,
            dry_run: self.dry_run,
            recreate: self.recreate,
            force: self.force,
            disable_hooks: self.disable_hooks,
            timeout_secs: self.timeout_secs,
            reset_values: self.reset_values,
            reuse_values: self.reuse_values,
            wait: self.wait,
            description: self.description.clone(),
        }
    }
}

/// Everything the operator asked for on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RolloutRequest {
    /// Name of the release to roll
    pub release: String,
    pub chart: ChartReference,
    pub overrides: ValueSources,
    /// Client certificates for chart and values downloads
    pub tls: TlsFiles,
    pub flags: DeployFlags,
    /// Accepted for command-line compatibility; canary upgrades need an existing release
    pub install: bool,
    pub namespace: Option<String>,
}
