//! Human-readable rendering of release status and release details

use super::{Release, StatusReport};
use chrono::{DateTime, Utc};
use std::io::Write;

/// Timestamp layout used in status output (ANSI C `asctime` style)
const TIME_LAYOUT: &str = "%a %b %e %H:%M:%S %Y";

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format(TIME_LAYOUT).to_string())
        .unwrap_or_default()
}

/// Print the status block shown at the end of a rollout
pub fn print_status(out: &mut dyn Write, report: &StatusReport) -> std::io::Result<()> {
    if report.info.last_deployed.is_some() {
        writeln!(out, "LAST DEPLOYED: {}", format_time(report.info.last_deployed))?;
    }
    writeln!(out, "NAMESPACE: {}", report.namespace)?;
    writeln!(out, "STATUS: {}", report.info.status)?;
    writeln!(out)?;

    if !report.resources.trim().is_empty() {
        writeln!(out, "RESOURCES:")?;
        writeln!(out, "{}", report.resources.trim_end())?;
        writeln!(out)?;
    }

    if !report.notes.trim().is_empty() {
        writeln!(out, "NOTES:")?;
        writeln!(out, "{}", report.notes.trim())?;
    }
    Ok(())
}

/// Print release details returned by an update (debug mode)
pub fn print_release(out: &mut dyn Write, release: &Release) -> std::io::Result<()> {
    writeln!(out, "NAME:   {}", release.name)?;
    writeln!(out, "REVISION: {}", release.version)?;
    writeln!(out, "RELEASED: {}", format_time(release.info.last_deployed))?;
    if let Some(chart) = &release.chart {
        writeln!(out, "CHART: {}-{}", chart.metadata.name, chart.metadata.version)?;
    }
    writeln!(out, "USER-SUPPLIED VALUES:")?;
    writeln!(out, "{}", release.config.raw.trim_end())?;
    if !release.manifest.trim().is_empty() {
        writeln!(out, "MANIFEST:")?;
        writeln!(out, "{}", release.manifest.trim_end())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::{Chart, ChartMetadata, Config, ReleaseInfo, StatusCode};
    use chrono::TimeZone;

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
    {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_print_status_full() {
        let report = StatusReport {
            name: "app".to_string(),
            namespace: "prod".to_string(),
            info: ReleaseInfo {
                status: StatusCode::Deployed,
                last_deployed: Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()),
                ..Default::default()
            },
            resources: "==> v1/Service\nNAME  TYPE\napp   ClusterIP\n".to_string(),
            notes: "Thank you for installing.\n".to_string(),
        };

        let out = render(|w| print_status(w, &report));

        assert_eq!(
            out,
            "LAST DEPLOYED: Wed May  1 10:00:00 2024\n\
             NAMESPACE: prod\n\
             STATUS: DEPLOYED\n\
             \n\
             RESOURCES:\n\
             ==> v1/Service\n\
             NAME  TYPE\n\
             app   ClusterIP\n\
             \n\
             NOTES:\n\
             Thank you for installing.\n"
        );
    }

    #[test]
    fn test_print_status_minimal() {
        let report = StatusReport {
            name: "app".to_string(),
            namespace: "default".to_string(),
            ..Default::default()
        };

        let out = render(|w| print_status(w, &report));
        assert_eq!(out, "NAMESPACE: default\nSTATUS: UNKNOWN\n\n");
    }

    #[test]
    fn test_print_release() {
        let release = Release {
            name: "app".to_string(),
            version: 7,
            chart: Some(Chart {
                metadata: ChartMetadata {
                    name: "canary-app".to_string(),
                    version: "0.3.0".to_string(),
                    app_version: None,
                },
                values: Config::default(),
            }),
            config: Config {
                raw: "currentVersion: vy\n".to_string(),
            },
            ..Default::default()
        };

        let out = render(|w| print_release(w, &release));
        assert!(out.contains("NAME:   app\n"));
        assert!(out.contains("REVISION: 7\n"));
        assert!(out.contains("CHART: canary-app-0.3.0\n"));
        assert!(out.contains("USER-SUPPLIED VALUES:\ncurrentVersion: vy\n"));
        assert!(!out.contains("MANIFEST:"));
    }
}
