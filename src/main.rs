use anyhow::Context as _;
use clap::Parser;
use helm_canary::chart::LocalChartResolver;
use helm_canary::cli::{Cli, Command};
use helm_canary::config::Settings;
use helm_canary::pause::TokioPause;
use helm_canary::release::HttpReleaseClient;
use helm_canary::rollout::{CanaryDriver, RolloutError};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};

/// Build the subscriber filter: RUST_LOG wins, otherwise info (debug with --debug)
fn log_filter(debug: bool) -> tracing_subscriber::EnvFilter {
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default))
}

/// Wire up the production client, resolver and pause
fn build_driver(settings: Settings) -> anyhow::Result<CanaryDriver> {
    let client = HttpReleaseClient::new(&settings)
        .with_context(|| format!("cannot create release client for {}", settings.host))?;
    let resolver = LocalChartResolver::from_settings(&settings);

    Ok(CanaryDriver::new(
        Arc::new(client),
        Arc::new(resolver),
        Arc::new(TokioPause),
        settings,
        Box::new(std::io::stdout()),
    ))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    cli.apply_to(&mut settings);

    // Logs go to stderr; stdout carries rollout progress only
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(settings.debug))
        .with_writer(std::io::stderr)
        .init();

    debug!(host = %settings.host, home = %settings.home.display(), "Settings loaded");

    let Command::CanaryUpgrade(args) = cli.command;
    let request = args.into_request();

    let mut driver = match build_driver(settings) {
        Ok(driver) => driver,
        Err(e) => {
            error!(error = ?e, "Failed to initialize");
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match driver.run(request).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn report(e: &RolloutError) {
    eprintln!("Error: {}", e);
    if e.rollout_completed() {
        eprintln!(
            "traffic was fully switched before the failure; check the release status manually"
        );
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
