use super::request::RolloutRequest;
use tracing::warn;

/// Longest release name the release service accepts
pub const MAX_RELEASE_NAME_LEN: usize = 53;

/// Validate a rollout request before any remote call is made
///
/// # Validation Rules
/// - release name is non-empty, at most 53 characters, made of ASCII
///   alphanumerics, `-`, `_` and `.`, starting and ending with an alphanumeric
/// - chart reference is non-empty
/// - timeout is at least one second
///
/// # Returns
/// * `Ok(())` - Validation passed
/// * `Err(String)` - Validation error message
pub fn validate_request(request: &RolloutRequest) -> Result<(), String> {
    let name = request.release.as_str();
    if name.is_empty() {
        return Err("release name is required".to_string());
    }
    if name.len() > MAX_RELEASE_NAME_LEN {
        return Err(format!(
            "release name {:?} exceeds max length of {}",
            name, MAX_RELEASE_NAME_LEN
        ));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    let valid_edges = name
        .chars()
        .next()
        .zip(name.chars().last())
        .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
        .unwrap_or(false);
    if !valid_chars || !valid_edges {
        return Err(format!(
            "invalid release name {:?}: must be alphanumerics, '-', '_' or '.', starting and ending with an alphanumeric",
            name
        ));
    }

    if request.chart.name.trim().is_empty() {
        return Err("chart path is required".to_string());
    }

    if request.flags.timeout_secs == 0 {
        return Err("timeout must be at least 1 second".to_string());
    }

    Ok(())
}

/// Resolve conflicting reuse/reset flags; reuse wins
pub fn normalize_request(request: &mut RolloutRequest) {
    if request.flags.reuse_values && request.flags.reset_values {
        warn!("both --reuse-values and --reset-values given, ignoring --reset-values");
        request.flags.reset_values = false;
    }
    if request.install {
        warn!(release = %request.release, "--install has no effect on canary upgrades");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartReference;

    fn request(name: &str) -> RolloutRequest {
        RolloutRequest {
            release: name.to_string(),
            chart: ChartReference {
                name: "./charts/app".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request() {
        for name in ["app", "my-app-2", "my_app", "App", "app.v2", "a"] {
            assert!(
                validate_request(&request(name)).is_ok(),
                "{} should be accepted",
                name
            );
        }
        let longest = "a".repeat(MAX_RELEASE_NAME_LEN);
        assert!(validate_request(&request(&longest)).is_ok());
    }

    #[test]
    fn test_empty_release_name() {
        assert_eq!(
            validate_request(&request("")),
            Err("release name is required".to_string())
        );
    }

    #[test]
    fn test_invalid_release_names() {
        for name in ["-app", "app-", "_app", "app_", ".app", "app.", "my app", "app/v2", "äpp"] {
            assert!(
                validate_request(&request(name)).is_err(),
                "{} should be rejected",
                name
            );
        }
        let long = "a".repeat(MAX_RELEASE_NAME_LEN + 1);
        assert!(validate_request(&request(&long))
            .unwrap_err()
            .contains("exceeds max length"));
    }

    #[test]
    fn test_empty_chart() {
        let mut req = request("app");
        req.chart.name = "  ".to_string();
        assert_eq!(
            validate_request(&req),
            Err("chart path is required".to_string())
        );
    }

    #[test]
    fn test_zero_timeout() {
        let mut req = request("app");
        req.flags.timeout_secs = 0;
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn test_reuse_takes_precedence_over_reset() {
        let mut req = request("app");
        req.flags.reuse_values = true;
        req.flags.reset_values = true;

        normalize_request(&mut req);

        assert!(req.flags.reuse_values);
        assert!(!req.flags.reset_values);
    }

    #[test]
    fn test_reset_alone_is_kept() {
        let mut req = request("app");
        req.flags.reset_values = true;

        normalize_request(&mut req);

        assert!(req.flags.reset_values);
    }
}
