use super::*;
use std::path::PathBuf;

#[test]
fn test_log_filter_defaults() {
    if std::env::var("RUST_LOG").is_ok() {
        return;
    }
    assert_eq!(log_filter(false).to_string(), "info");
    assert_eq!(log_filter(true).to_string(), "debug");
}

#[test]
fn test_build_driver_with_plain_host() {
    let mut settings = Settings::from_lookup(|_| None);
    settings.host = "localhost:44134".to_string();
    settings.home = PathBuf::from("/tmp/helm-canary-home");

    assert!(build_driver(settings).is_ok());
}

#[test]
fn test_build_driver_rejects_unreadable_tls_files() {
    let mut settings = Settings::from_lookup(|_| None);
    settings.tls.enable = true;
    settings.tls.cert_file = Some(PathBuf::from("/nonexistent/client.pem"));
    settings.tls.key_file = Some(PathBuf::from("/nonexistent/client.key"));

    let err = build_driver(settings).err().unwrap();
    assert!(format!("{:#}", err).contains("cannot create release client"));
}
