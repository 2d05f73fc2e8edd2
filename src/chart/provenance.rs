//! Chart provenance checks
//!
//! A provenance file (`<archive>.prov`) is a clear-signed document whose body
//! lists the sha256 digest of the archive under `files:`. The keyring must
//! exist and the recorded digest must match the archive on disk. Evaluating the
//! PGP signature is not supported, so a chart never passes verification: after
//! the integrity checks [`verify_chart`] fails with
//! [`ChartError::SignatureUnsupported`].

use super::ChartError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path of the provenance file that belongs to `archive`
pub fn provenance_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".prov");
    PathBuf::from(name)
}

/// Extract the digest recorded for `file_name` from a provenance document
pub fn recorded_digest(provenance: &str, file_name: &str) -> Option<String> {
    let mut in_files = false;
    for line in provenance.lines() {
        let trimmed = line.trim();
        if trimmed == "files:" {
            in_files = true;
            continue;
        }
        if !in_files {
            continue;
        }
        if !line.starts_with(' ') && !line.starts_with('\t') {
            // Left the indented `files:` block
            in_files = false;
            continue;
        }
        if let Some((name, digest)) = trimmed.split_once(':') {
            if name.trim() == file_name {
                let digest = digest.trim();
                return Some(digest.strip_prefix("sha256:").unwrap_or(digest).to_string());
            }
        }
    }
    None
}

/// Hex encoded sha256 of a file
pub fn digest_file(path: &Path) -> Result<String, ChartError> {
    let bytes = std::fs::read(path).map_err(|source| ChartError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Verify a chart archive against its provenance file
///
/// Digest mismatches and missing files are reported first. A chart whose
/// digest matches still fails, since the signature cannot be checked.
pub fn verify_chart(archive: &Path, keyring: &Path) -> Result<(), ChartError> {
    if !keyring.exists() {
        return Err(ChartError::Provenance(format!(
            "keyring {} not found",
            keyring.display()
        )));
    }

    let prov_path = provenance_path(archive);
    let provenance = std::fs::read_to_string(&prov_path).map_err(|e| {
        ChartError::Provenance(format!("cannot read {}: {}", prov_path.display(), e))
    })?;

    let file_name = archive
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_default();
    let expected = recorded_digest(&provenance, &file_name).ok_or_else(|| {
        ChartError::Provenance(format!("no digest recorded for {}", file_name))
    })?;

    let actual = digest_file(archive)?;
    if !actual.eq_ignore_ascii_case(&expected) {
        return Err(ChartError::Provenance(format!(
            "sha256 sum does not match for {}: {:?} != {:?}",
            file_name, actual, expected
        )));
    }

    debug!(archive = %archive.display(), "Chart digest matches provenance");
    Err(ChartError::SignatureUnsupported(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance_for(file_name: &str, digest: &str) -> String {
        format!(
            "-----BEGIN PGP SIGNED MESSAGE-----\n\
             Hash: SHA512\n\
             \n\
             apiVersion: v1\n\
             name: canary-app\n\
             version: 0.3.0\n\
             \n\
             ...\n\
             files:\n  {}: sha256:{}\n\
             -----BEGIN PGP SIGNATURE-----\n\
             abc\n\
             -----END PGP SIGNATURE-----\n",
            file_name, digest
        )
    }

    #[test]
    fn test_recorded_digest() {
        let prov = provenance_for("canary-app-0.3.0.tgz", "deadbeef");
        assert_eq!(
            recorded_digest(&prov, "canary-app-0.3.0.tgz"),
            Some("deadbeef".to_string())
        );
        assert_eq!(recorded_digest(&prov, "other.tgz"), None);
    }

    #[test]
    fn test_provenance_path() {
        assert_eq!(
            provenance_path(Path::new("/cache/canary-app-0.3.0.tgz")),
            PathBuf::from("/cache/canary-app-0.3.0.tgz.prov")
        );
    }

    #[test]
    fn test_verify_chart_never_passes_without_signature_check() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("canary-app-0.3.0.tgz");
        let keyring = dir.path().join("pubring.gpg");
        std::fs::write(&archive, b"chart bytes").unwrap();
        std::fs::write(&keyring, b"keys").unwrap();

        let digest = digest_file(&archive).unwrap();
        std::fs::write(
            provenance_path(&archive),
            provenance_for("canary-app-0.3.0.tgz", &digest),
        )
        .unwrap();

        let err = verify_chart(&archive, &keyring).unwrap_err();
        assert!(
            matches!(&err, ChartError::SignatureUnsupported(name) if name == "canary-app-0.3.0.tgz")
        );
        assert!(err.to_string().contains("signature verification unsupported"));
    }

    #[test]
    fn test_verify_chart_rejects_unsigned_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil-1.0.0.tgz");
        let keyring = dir.path().join("pubring.gpg");
        std::fs::write(&archive, b"forged chart").unwrap();
        std::fs::write(&keyring, b"").unwrap();

        let digest = digest_file(&archive).unwrap();
        std::fs::write(
            provenance_path(&archive),
            format!("files:\n  evil-1.0.0.tgz: sha256:{}\n", digest),
        )
        .unwrap();

        assert!(verify_chart(&archive, &keyring).is_err());
    }

    #[test]
    fn test_verify_chart_rejects_tampered_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("canary-app-0.3.0.tgz");
        let keyring = dir.path().join("pubring.gpg");
        std::fs::write(&archive, b"tampered").unwrap();
        std::fs::write(&keyring, b"keys").unwrap();
        std::fs::write(
            provenance_path(&archive),
            provenance_for("canary-app-0.3.0.tgz", "00ff"),
        )
        .unwrap();

        let err = verify_chart(&archive, &keyring).unwrap_err();
        assert!(err.to_string().contains("sha256 sum does not match"));
    }

    #[test]
    fn test_verify_chart_requires_keyring_and_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("canary-app-0.3.0.tgz");
        std::fs::write(&archive, b"chart bytes").unwrap();

        let missing_keyring = verify_chart(&archive, &dir.path().join("nope.gpg"));
        assert!(matches!(missing_keyring, Err(ChartError::Provenance(m)) if m.contains("keyring")));

        let keyring = dir.path().join("pubring.gpg");
        std::fs::write(&keyring, b"keys").unwrap();
        let missing_prov = verify_chart(&archive, &keyring);
        assert!(
            matches!(missing_prov, Err(ChartError::Provenance(m)) if m.contains("cannot read"))
        );
    }
}
