//! Command line surface
//!
//! Global flags override connection [`Settings`]; the `canary-upgrade`
//! subcommand turns into a [`RolloutRequest`].

use crate::chart::{ChartReference, DEVEL_CONSTRAINT};
use crate::config::{default_keyring, Settings};
use crate::release::DEFAULT_TIMEOUT_SECS;
use crate::rollout::{DeployFlags, RolloutRequest};
use crate::transport::TlsFiles;
use crate::values::ValueSources;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Parser)]
#[command(
    name = "helm-canary",
    about = "Canary upgrades between the vx and vy slots of a release",
    version
)]
pub struct Cli {
    /// Address of the release service (overrides $HELM_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Location of the local home directory (overrides $HELM_HOME)
    #[arg(long, global = true)]
    pub home: Option<PathBuf>,

    /// Print release details after every update and verbose logs
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use TLS for the release service connection
    #[arg(long, global = true)]
    pub tls: bool,

    /// Use TLS and verify the remote certificate
    #[arg(long = "tls-verify", global = true)]
    pub tls_verify: bool,

    /// Path to the TLS CA certificate file
    #[arg(long = "tls-ca-cert", global = true)]
    pub tls_ca_cert: Option<PathBuf>,

    /// Path to the TLS certificate file
    #[arg(long = "tls-cert", global = true)]
    pub tls_cert: Option<PathBuf>,

    /// Path to the TLS key file
    #[arg(long = "tls-key", global = true)]
    pub tls_key: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upgrade a release by shifting traffic from the current variant to the other one.
    ///
    /// The target variant is deployed at the current replica count, traffic is
    /// moved over in five 20% steps with a settle delay after each, then the old
    /// variant is scaled to zero and `currentVersion` is flipped.
    #[command(name = "canary-upgrade", visible_alias = "istio-upgrade")]
    CanaryUpgrade(UpgradeArgs),
}

#[derive(Debug, Args)]
pub struct UpgradeArgs {
    /// Name of the release to upgrade
    pub release: String,

    /// Chart path, archive or chart name
    pub chart: String,

    /// Specify values in a YAML file or a URL (can specify multiple)
    #[arg(short = 'f', long = "values")]
    pub values: Vec<String>,

    /// Set values on the command line (can specify multiple or separate values with commas: key1=val1,key2=val2)
    #[arg(long)]
    pub set: Vec<String>,

    /// Set STRING values on the command line
    #[arg(long = "set-string")]
    pub set_string: Vec<String>,

    /// Set values from respective files (key1=path1,key2=path2)
    #[arg(long = "set-file")]
    pub set_file: Vec<String>,

    /// Simulate an upgrade
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Performs pods restart for the resource if applicable
    #[arg(long = "recreate-pods")]
    pub recreate_pods: bool,

    /// Force resource update through delete/recreate if needed
    #[arg(long)]
    pub force: bool,

    /// Disable pre/post upgrade hooks
    #[arg(long = "no-hooks")]
    pub no_hooks: bool,

    /// Disable pre/post upgrade hooks. DEPRECATED. Use no-hooks
    #[arg(long = "disable-hooks", hide = true)]
    pub disable_hooks: bool,

    /// Verify the provenance of the chart before upgrading
    #[arg(long)]
    pub verify: bool,

    /// Path to the keyring that contains public signing keys
    #[arg(long)]
    pub keyring: Option<PathBuf>,

    /// Accepted for compatibility; the release must already exist
    #[arg(short = 'i', long)]
    pub install: bool,

    /// Namespace of the release
    #[arg(long)]
    pub namespace: Option<String>,

    /// Specify the exact chart version to use. If not specified, the latest version is used
    #[arg(long = "version")]
    pub chart_version: Option<String>,

    /// Time in seconds to wait for any individual operation
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// When upgrading, reset the values to the ones built into the chart
    #[arg(long = "reset-values")]
    pub reset_values: bool,

    /// When upgrading, reuse the last release's values and merge in any overrides. Takes precedence over --reset-values
    #[arg(long = "reuse-values")]
    pub reuse_values: bool,

    /// Wait until all resources are ready before marking the release as successful
    #[arg(long)]
    pub wait: bool,

    /// Chart repository url where to locate the requested chart
    #[arg(long)]
    pub repo: Option<String>,

    /// Chart repository username
    #[arg(long)]
    pub username: Option<String>,

    /// Chart repository password
    #[arg(long)]
    pub password: Option<String>,

    /// Identify HTTPS client using this SSL certificate file
    #[arg(long = "cert-file")]
    pub cert_file: Option<PathBuf>,

    /// Identify HTTPS client using this SSL key file
    #[arg(long = "key-file")]
    pub key_file: Option<PathBuf>,

    /// Verify certificates of HTTPS-enabled servers using this CA bundle
    #[arg(long = "ca-file")]
    pub ca_file: Option<PathBuf>,

    /// Use development versions too. Equivalent to version '>0.0.0-0'. If --version is set, this is ignored
    #[arg(long)]
    pub devel: bool,

    /// Specify the description to use for the upgrade
    #[arg(long)]
    pub description: Option<String>,
}

impl Cli {
    /// Apply global flags on top of environment settings
    pub fn apply_to(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(home) = &self.home {
            settings.home = home.clone();
        }
        settings.debug |= self.debug;
        settings.tls.enable |= self.tls;
        settings.tls.verify |= self.tls_verify;
        if let Some(ca) = &self.tls_ca_cert {
            settings.tls.ca_file = Some(ca.clone());
        }
        if let Some(cert) = &self.tls_cert {
            settings.tls.cert_file = Some(cert.clone());
        }
        if let Some(key) = &self.tls_key {
            settings.tls.key_file = Some(key.clone());
        }
    }
}

impl UpgradeArgs {
    /// Chart version constraint, with `--devel` filling in for a missing `--version`
    pub fn version_constraint(&self) -> Option<String> {
        match &self.chart_version {
            Some(version) if !version.is_empty() => Some(version.clone()),
            _ if self.devel => Some(DEVEL_CONSTRAINT.to_string()),
            _ => None,
        }
    }

    pub fn into_request(self) -> RolloutRequest {
        if self.disable_hooks {
            warn!("--disable-hooks is deprecated, use --no-hooks");
        }
        let chart = ChartReference {
            name: self.chart.clone(),
            version: self.version_constraint(),
            repo_url: self.repo,
            username: self.username,
            password: self.password,
            verify: self.verify,
            keyring: self.keyring.unwrap_or_else(default_keyring),
        };

        RolloutRequest {
            release: self.release,
            chart,
            overrides: ValueSources {
                value_files: self.values,
                set: self.set,
                set_string: self.set_string,
                set_file: self.set_file,
            },
            tls: TlsFiles {
                cert_file: self.cert_file,
                key_file: self.key_file,
                ca_file: self.ca_file,
            },
            flags: DeployFlags {
                dry_run: self.dry_run,
                recreate: self.recreate_pods,
                force: self.force,
                disable_hooks: self.no_hooks || self.disable_hooks,
                timeout_secs: self.timeout,
                reset_values: self.reset_values,
                reuse_values: self.reuse_values,
                wait: self.wait,
                description: self.description,
            },
            install: self.install,
            namespace: self.namespace,
        }
    }
}
