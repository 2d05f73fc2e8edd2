//! Connection settings shared by the release client and the chart resolver
//!
//! Settings are read once from the environment, overridden by global CLI flags
//! and then passed explicitly to whatever needs them.

use std::path::PathBuf;

/// Default release service address when `HELM_HOST` is not set
pub const DEFAULT_HOST: &str = "http://localhost:44134";

/// TLS settings for the connection to the release service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsSettings {
    /// Use TLS for the release service connection
    pub enable: bool,
    /// Verify the server certificate (implies `enable`)
    pub verify: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
}

impl TlsSettings {
    /// TLS is in use when either enabled or verifying
    pub fn is_enabled(&self) -> bool {
        self.enable || self.verify
    }
}

/// Process-wide connection settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Address of the release service
    pub host: String,
    /// Local home directory (repository cache, downloaded archives)
    pub home: PathBuf,
    /// Print release details after every update
    pub debug: bool,
    pub tls: TlsSettings,
}

impl Settings {
    /// Load settings from the process environment
    ///
    /// Configuration from environment variables:
    /// - HELM_HOST: release service address (default: http://localhost:44134)
    /// - HELM_HOME: home directory (default: $HOME/.helm)
    /// - HELM_DEBUG: "true" or "1" to print release details
    /// - HELM_TLS_ENABLE / HELM_TLS_VERIFY: "true" or "1"
    /// - HELM_TLS_CA_CERT / HELM_TLS_CERT / HELM_TLS_KEY: PEM file paths
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key)
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false)
        };
        let path = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);

        let home = path("HELM_HOME").unwrap_or_else(|| {
            lookup("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".helm")
        });

        Settings {
            host: lookup("HELM_HOST")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            home,
            debug: flag("HELM_DEBUG"),
            tls: TlsSettings {
                enable: flag("HELM_TLS_ENABLE"),
                verify: flag("HELM_TLS_VERIFY"),
                ca_file: path("HELM_TLS_CA_CERT"),
                cert_file: path("HELM_TLS_CERT"),
                key_file: path("HELM_TLS_KEY"),
            },
        }
    }

    /// Directory holding charts that were already fetched from repositories
    pub fn repository_dir(&self) -> PathBuf {
        self.home.join("repository")
    }

    /// Directory downloaded chart archives are written to
    pub fn archive_dir(&self) -> PathBuf {
        self.home.join("cache").join("archive")
    }
}

/// Default keyring used to verify chart provenance
pub fn default_keyring() -> PathBuf {
    if let Ok(gnupg_home) = std::env::var("GNUPGHOME") {
        return PathBuf::from(gnupg_home).join("pubring.gpg");
    }
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".gnupg")
        .join("pubring.gpg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[("HOME", "/home/ops")]));

        assert_eq!(settings.host, DEFAULT_HOST);
        assert_eq!(settings.home, PathBuf::from("/home/ops/.helm"));
        assert!(!settings.debug);
        assert_eq!(settings.tls, TlsSettings::default());
    }

    #[test]
    fn test_settings_from_env_vars() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("HELM_HOST", "https://tiller.kube-system:44134"),
            ("HELM_HOME", "/srv/helm"),
            ("HELM_DEBUG", "1"),
            ("HELM_TLS_VERIFY", "true"),
            ("HELM_TLS_CA_CERT", "/srv/helm/ca.pem"),
        ]));

        assert_eq!(settings.host, "https://tiller.kube-system:44134");
        assert_eq!(settings.home, PathBuf::from("/srv/helm"));
        assert!(settings.debug);
        assert!(settings.tls.is_enabled());
        assert_eq!(settings.tls.ca_file, Some(PathBuf::from("/srv/helm/ca.pem")));
        assert_eq!(settings.tls.cert_file, None);
    }

    #[test]
    fn test_settings_derived_dirs() {
        let settings = Settings::from_lookup(lookup_from(&[("HELM_HOME", "/h")]));
        assert_eq!(settings.repository_dir(), PathBuf::from("/h/repository"));
        assert_eq!(settings.archive_dir(), PathBuf::from("/h/cache/archive"));
    }

    #[test]
    fn test_empty_host_falls_back_to_default() {
        let settings = Settings::from_lookup(lookup_from(&[("HELM_HOST", "")]));
        assert_eq!(settings.host, DEFAULT_HOST);
    }
}
