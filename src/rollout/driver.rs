use super::error::RolloutError;
use super::request::RolloutRequest;
use super::state::{RolloutState, CURRENT_VERSION_KEY, REPLICA_COUNT_KEY};
use super::traffic::{traffic_schedule, TrafficSplit, Variant};
use super::validation::{normalize_request, validate_request};
use crate::chart::ChartResolver;
use crate::config::Settings;
use crate::pause::Pause;
use crate::release::status::{print_release, print_status};
use crate::release::{Release, ReleaseClient, StatusReport, UpdateOptions};
use crate::values::{coalesce, read_values, ValueSources, Values};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Time given to the cluster to converge after every update
pub const SETTLE_DELAY: Duration = Duration::from_secs(60);

/// Outcome of a completed rollout
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutReport {
    pub release: String,
    /// Variant that served traffic before the rollout
    pub from: Variant,
    /// Variant serving all traffic now
    pub to: Variant,
    pub replica_count: u32,
    pub status: StatusReport,
}

/// Drives a five step canary cutover between the `vx` and `vy` slots of a release
///
/// The driver keeps no state between runs. If it stops half way, the release
/// values show which phase was applied last.
pub struct CanaryDriver {
    client: Arc<dyn ReleaseClient>,
    resolver: Arc<dyn ChartResolver>,
    pause: Arc<dyn Pause>,
    settings: Settings,
    out: Box<dyn Write + Send>,
    settle_delay: Duration,
}

impl CanaryDriver {
    /// Create a driver
    ///
    /// # Arguments
    /// * `client` - Release service client
    /// * `resolver` - Chart resolver
    /// * `pause` - Settling delay implementation
    /// * `settings` - Connection settings (debug output)
    /// * `out` - Sink for progress text
    pub fn new(
        client: Arc<dyn ReleaseClient>,
        resolver: Arc<dyn ChartResolver>,
        pause: Arc<dyn Pause>,
        settings: Settings,
        out: Box<dyn Write + Send>,
    ) -> Self {
        CanaryDriver {
            client,
            resolver,
            pause,
            settings,
            out,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Run a complete rollout
    ///
    /// Phases, each aborting the rollout on its first error:
    /// 1. Resolve the chart and check its dependencies
    /// 2. Fetch the release and decode `currentVersion` / `replicaCount`
    /// 3. Deploy the target variant at the current replica count
    /// 4. Shift traffic 20% at a time over five steps
    /// 5. Scale the old variant to zero and flip `currentVersion`
    /// 6. Fetch and print the final status
    ///
    /// Traffic already shifted is never rolled back automatically.
    pub async fn run(
        &mut self,
        mut request: RolloutRequest,
    ) -> Result<RolloutReport, RolloutError> {
        normalize_request(&mut request);
        validate_request(&request).map_err(RolloutError::InvalidRequest)?;

        info!(
            release = %request.release,
            chart = %request.chart.name,
            dry_run = request.flags.dry_run,
            "Starting canary rollout"
        );

        let result = self.execute(&request).await;
        match &result {
            Ok(report) => info!(
                release = %report.release,
                from = %report.from,
                to = %report.to,
                "Canary rollout completed"
            ),
            Err(e) => error!(
                release = %request.release,
                phase = e.phase(),
                error = %e,
                "Canary rollout failed"
            ),
        }
        result
    }

    async fn execute(&mut self, request: &RolloutRequest) -> Result<RolloutReport, RolloutError> {
        let chart_path = self.resolver.resolve(&request.chart, &request.tls).await?;
        self.resolver.check_dependencies(&chart_path)?;
        debug!(chart = %chart_path.display(), "Chart resolved");

        let release = self
            .client
            .release_content(&request.release, 0)
            .await
            .map_err(RolloutError::ReleaseLookup)?;
        let values = release_values(&release)?;
        let state = RolloutState::decode(&values, chart_path)?;

        writeln!(
            self.out,
            "start upgrade, currentVersion: {}, targetVersion: {}",
            state.current, state.target
        )?;

        // Image overrides from here on address the target slot
        let mut overrides = request.overrides.clone();
        overrides.rewrite_image_keys(state.target.label());

        self.deploy_target(request, &overrides, &state).await?;
        writeln!(self.out, "deployed")?;
        self.nap().await?;

        for split in traffic_schedule() {
            self.switch_traffic(request, &overrides, &state, split)
                .await?;
        }

        self.wrap_up(request, &overrides, &state).await?;

        let status = self
            .client
            .release_status(&request.release)
            .await
            .map_err(RolloutError::Status)?;
        print_status(&mut *self.out, &status)?;

        Ok(RolloutReport {
            release: request.release.clone(),
            from: state.current,
            to: state.target,
            replica_count: state.replica_count,
            status,
        })
    }

    async fn deploy_target(
        &mut self,
        request: &RolloutRequest,
        overrides: &ValueSources,
        state: &RolloutState,
    ) -> Result<(), RolloutError> {
        writeln!(
            self.out,
            "deploy {} replica for target version",
            state.replica_count
        )?;

        let sources = overrides.with_set(format!(
            "{}.{}={}",
            state.target, REPLICA_COUNT_KEY, state.replica_count
        ));
        let values = sources.build(&request.tls).await?;
        let options = request.flags.update_options(values);

        info!(
            release = %request.release,
            target = %state.target,
            replicas = state.replica_count,
            "Deploying target variant"
        );
        let response = self
            .client
            .update_release(&request.release, &state.chart_path, options)
            .await
            .map_err(RolloutError::Deploy)?;

        self.print_debug(&response)?;
        writeln!(self.out, "target version {:?} deployed", request.release)?;
        Ok(())
    }

    async fn switch_traffic(
        &mut self,
        request: &RolloutRequest,
        overrides: &ValueSources,
        state: &RolloutState,
        split: TrafficSplit,
    ) -> Result<(), RolloutError> {
        writeln!(
            self.out,
            "switching {}% traffic to target version",
            split.target_weight
        )?;

        let sources = overrides.with_set(split.set_value(state.current, state.target));
        let values = sources.build(&request.tls).await?;

        info!(
            release = %request.release,
            step = split.step,
            current_weight = split.current_weight,
            target_weight = split.target_weight,
            "Shifting traffic"
        );
        let response = self
            .client
            .update_release(
                &request.release,
                &state.chart_path,
                self.follow_up_options(request, values),
            )
            .await
            .map_err(|source| RolloutError::TrafficShift {
                step: split.step,
                target_weight: split.target_weight,
                source,
            })?;

        self.print_debug(&response)?;
        writeln!(
            self.out,
            "{}% traffic has been switched to new release",
            split.target_weight
        )?;
        self.nap().await
    }

    async fn wrap_up(
        &mut self,
        request: &RolloutRequest,
        overrides: &ValueSources,
        state: &RolloutState,
    ) -> Result<(), RolloutError> {
        writeln!(self.out, "wrapping up")?;

        let sources = overrides.with_set(format!(
            "{}.{}=0,{}={}",
            state.current, REPLICA_COUNT_KEY, CURRENT_VERSION_KEY, state.target
        ));
        let values = sources.build(&request.tls).await?;

        info!(
            release = %request.release,
            retired = %state.current,
            current = %state.target,
            "Retiring previous variant"
        );
        let response = self
            .client
            .update_release(
                &request.release,
                &state.chart_path,
                self.follow_up_options(request, values),
            )
            .await
            .map_err(RolloutError::Wrapup)?;

        self.print_debug(&response)?;
        writeln!(self.out, "done upgrading")?;
        Ok(())
    }

    /// Options for traffic-shift and wrap-up updates
    ///
    /// Previous values are always reused. Dry runs stay dry for every phase.
    fn follow_up_options(&self, request: &RolloutRequest, values: Values) -> UpdateOptions {
        UpdateOptions {
            dry_run: request.flags.dry_run,
            ..UpdateOptions::reusing(values)
        }
    }

    async fn nap(&mut self) -> Result<(), RolloutError> {
        writeln!(self.out, "napping for {}s", self.settle_delay.as_secs())?;
        self.out.flush()?;
        self.pause.pause(self.settle_delay).await;
        Ok(())
    }

    fn print_debug(&mut self, release: &Release) -> Result<(), RolloutError> {
        if self.settings.debug {
            print_release(&mut *self.out, release)?;
        }
        Ok(())
    }
}

/// Stored release values coalesced over the chart defaults
fn release_values(release: &Release) -> Result<Values, RolloutError> {
    let config = read_values("release config", &release.config.raw)
        .map_err(RolloutError::ReleaseValues)?;
    let defaults = match &release.chart {
        Some(chart) => read_values("chart values", &chart.values.raw)
            .map_err(RolloutError::ReleaseValues)?,
        None => Values::new(),
    };
    Ok(coalesce(&defaults, &config))
}
