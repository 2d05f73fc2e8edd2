//! HTTP client construction with optional client certificates
//!
//! Shared by the release client, chart repository downloads and remote values files.

use crate::config::TlsSettings;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot read {path}: {source}")]
    ReadPem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("client certificate and key must be given together")]
    IncompleteIdentity,

    #[error("invalid TLS material in {path}: {message}")]
    InvalidPem { path: PathBuf, message: String },

    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// Certificate files identifying this client to HTTPS servers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsFiles {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
}

impl TlsFiles {
    pub fn is_empty(&self) -> bool {
        self.cert_file.is_none() && self.key_file.is_none() && self.ca_file.is_none()
    }
}

impl From<&TlsSettings> for TlsFiles {
    fn from(tls: &TlsSettings) -> Self {
        TlsFiles {
            cert_file: tls.cert_file.clone(),
            key_file: tls.key_file.clone(),
            ca_file: tls.ca_file.clone(),
        }
    }
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn read_pem(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|source| TransportError::ReadPem {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a reqwest client from certificate files
///
/// # Arguments
/// * `files` - Optional client identity (cert + key) and CA bundle
/// * `insecure` - Skip server certificate verification
pub fn build_http_client(
    files: &TlsFiles,
    insecure: bool,
) -> Result<reqwest::Client, TransportError> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .use_rustls_tls();

    match (&files.cert_file, &files.key_file) {
        (Some(cert), Some(key)) => {
            let mut pem = read_pem(cert)?;
            pem.push(b'\n');
            pem.extend(read_pem(key)?);
            let identity =
                reqwest::Identity::from_pem(&pem).map_err(|e| TransportError::InvalidPem {
                    path: cert.clone(),
                    message: e.to_string(),
                })?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => return Err(TransportError::IncompleteIdentity),
    }

    if let Some(ca) = &files.ca_file {
        let pem = read_pem(ca)?;
        let certificate =
            reqwest::Certificate::from_pem(&pem).map_err(|e| TransportError::InvalidPem {
                path: ca.clone(),
                message: e.to_string(),
            })?;
        builder = builder.add_root_certificate(certificate);
    }

    if insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if !files.is_empty() || insecure {
        debug!(
            client_identity = files.cert_file.is_some(),
            custom_ca = files.ca_file.is_some(),
            insecure,
            "Building TLS-configured HTTP client"
        );
    }

    builder
        .build()
        .map_err(|e| TransportError::Build(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_plain_client() {
        assert!(build_http_client(&TlsFiles::default(), false).is_ok());
    }

    #[test]
    fn test_cert_without_key_is_rejected() {
        let files = TlsFiles {
            cert_file: Some(PathBuf::from("/tmp/client.pem")),
            ..Default::default()
        };
        let result = build_http_client(&files, false);
        assert!(matches!(result, Err(TransportError::IncompleteIdentity)));
    }

    #[test]
    fn test_missing_ca_file_reports_path() {
        let files = TlsFiles {
            ca_file: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..Default::default()
        };
        match build_http_client(&files, false) {
            Err(TransportError::ReadPem { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/ca.pem"))
            }
            other => panic!("expected ReadPem error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_tls_files_from_settings() {
        let settings = TlsSettings {
            enable: true,
            cert_file: Some(PathBuf::from("c.pem")),
            key_file: Some(PathBuf::from("k.pem")),
            ..Default::default()
        };
        let files = TlsFiles::from(&settings);
        assert!(!files.is_empty());
        assert_eq!(files.ca_file, None);
    }
}
