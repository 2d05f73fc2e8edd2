use super::state::ConfigShapeError;
use crate::chart::ChartError;
use crate::release::ReleaseError;
use crate::values::ValuesError;
use thiserror::Error;

/// Errors that end a rollout
///
/// None of them are retried; an operator has to inspect the release to see
/// which phase completed last.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("invalid rollout request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    ChartResolution(#[from] ChartError),

    #[error("UPGRADE FAILED: {0}")]
    ReleaseLookup(#[source] ReleaseError),

    #[error("invalid release configuration: {0}")]
    ConfigShape(#[from] ConfigShapeError),

    #[error("cannot load release values: {0}")]
    ReleaseValues(#[source] ValuesError),

    #[error(transparent)]
    Values(#[from] ValuesError),

    #[error("UPGRADE FAILED: {0}")]
    Deploy(#[source] ReleaseError),

    #[error("UPGRADE FAILED: {source}")]
    TrafficShift {
        step: u8,
        target_weight: u8,
        #[source]
        source: ReleaseError,
    },

    #[error("UPGRADE FAILED: {0}")]
    Wrapup(#[source] ReleaseError),

    #[error("UPGRADE FAILED: {0} (rollout completed, final status unavailable)")]
    Status(#[source] ReleaseError),

    #[error("failed to write progress output: {0}")]
    Output(#[from] std::io::Error),
}

impl RolloutError {
    /// Whether the traffic cutover finished before this error
    pub fn rollout_completed(&self) -> bool {
        matches!(self, RolloutError::Status(_))
    }

    /// Phase name for logs
    pub fn phase(&self) -> &'static str {
        match self {
            RolloutError::InvalidRequest(_) => "validate",
            RolloutError::ChartResolution(_) => "resolve-chart",
            RolloutError::ReleaseLookup(_) | RolloutError::ReleaseValues(_) => "lookup",
            RolloutError::ConfigShape(_) => "decode",
            RolloutError::Values(_) => "values",
            RolloutError::Deploy(_) => "deploy",
            RolloutError::TrafficShift { .. } => "traffic-shift",
            RolloutError::Wrapup(_) => "wrap-up",
            RolloutError::Status(_) => "status",
            RolloutError::Output(_) => "output",
        }
    }
}
