use super::traffic::Variant;
use crate::values::Values;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;

/// Values key holding the slot that currently serves traffic
pub const CURRENT_VERSION_KEY: &str = "currentVersion";

/// Values key holding the replica count of the serving slot
pub const REPLICA_COUNT_KEY: &str = "replicaCount";

/// Stored release configuration does not have the shape a canary rollout needs
#[derive(Debug, Error, PartialEq)]
pub enum ConfigShapeError {
    #[error("release values have no {0:?} field")]
    Missing(&'static str),

    #[error("release value {field:?} must be {expected}, got {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("release value {field:?}: {message}")]
    Invalid { field: &'static str, message: String },
}

/// Working state of one rollout, derived from the stored release values
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutState {
    pub current: Variant,
    pub target: Variant,
    pub chart_path: PathBuf,
    pub replica_count: u32,
}

impl RolloutState {
    /// Decode the rollout state from coalesced release values
    ///
    /// Fails before anything is deployed if `currentVersion` or `replicaCount`
    /// is missing or has the wrong type.
    pub fn decode(values: &Values, chart_path: PathBuf) -> Result<Self, ConfigShapeError> {
        let current = decode_variant(values)?;
        let replica_count = decode_replica_count(values)?;
        Ok(RolloutState {
            current,
            target: current.complement(),
            chart_path,
            replica_count,
        })
    }
}

fn type_name(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(_) => "list".to_string(),
        Value::Object(_) => "map".to_string(),
    }
}

fn decode_variant(values: &Values) -> Result<Variant, ConfigShapeError> {
    let value = values
        .get(CURRENT_VERSION_KEY)
        .ok_or(ConfigShapeError::Missing(CURRENT_VERSION_KEY))?;
    let label = value.as_str().ok_or_else(|| ConfigShapeError::WrongType {
        field: CURRENT_VERSION_KEY,
        expected: "a string",
        found: type_name(value),
    })?;
    label.parse().map_err(|message| ConfigShapeError::Invalid {
        field: CURRENT_VERSION_KEY,
        message,
    })
}

fn decode_replica_count(values: &Values) -> Result<u32, ConfigShapeError> {
    let value = values
        .get(REPLICA_COUNT_KEY)
        .ok_or(ConfigShapeError::Missing(REPLICA_COUNT_KEY))?;
    let wrong_type = || ConfigShapeError::WrongType {
        field: REPLICA_COUNT_KEY,
        expected: "a non-negative integer",
        found: type_name(value),
    };
    let Value::Number(number) = value else {
        return Err(wrong_type());
    };

    // YAML and JSON sources may carry whole numbers as floats (3.0)
    let count = match (number.as_u64(), number.as_f64()) {
        (Some(n), _) => n,
        (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64 => f as u64,
        _ => return Err(wrong_type()),
    };
    u32::try_from(count).map_err(|_| ConfigShapeError::Invalid {
        field: REPLICA_COUNT_KEY,
        message: format!("{} is out of range", count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(value: Value) -> Values {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_decode_valid_state() {
        let state = RolloutState::decode(
            &values(json!({"currentVersion": "vx", "replicaCount": 3})),
            PathBuf::from("/charts/app"),
        )
        .unwrap();

        assert_eq!(state.current, Variant::Vx);
        assert_eq!(state.target, Variant::Vy);
        assert_eq!(state.replica_count, 3);
        assert_eq!(state.chart_path, PathBuf::from("/charts/app"));
    }

    #[test]
    fn test_decode_target_is_complement() {
        let state = RolloutState::decode(
            &values(json!({"currentVersion": "vy", "replicaCount": 0})),
            PathBuf::new(),
        )
        .unwrap();
        assert_eq!(state.current, Variant::Vy);
        assert_eq!(state.target, Variant::Vx);
        assert_eq!(state.replica_count, 0);
    }

    #[test]
    fn test_decode_whole_float_replica_count() {
        let state = RolloutState::decode(
            &values(json!({"currentVersion": "vx", "replicaCount": 3.0})),
            PathBuf::new(),
        )
        .unwrap();
        assert_eq!(state.replica_count, 3);
    }

    #[test]
    fn test_missing_current_version() {
        let err = RolloutState::decode(&values(json!({"replicaCount": 3})), PathBuf::new())
            .unwrap_err();
        assert_eq!(err, ConfigShapeError::Missing("currentVersion"));
    }

    #[test]
    fn test_missing_replica_count() {
        let err = RolloutState::decode(&values(json!({"currentVersion": "vx"})), PathBuf::new())
            .unwrap_err();
        assert_eq!(err, ConfigShapeError::Missing("replicaCount"));
    }

    #[test]
    fn test_wrong_types() {
        let err = RolloutState::decode(
            &values(json!({"currentVersion": 1, "replicaCount": 3})),
            PathBuf::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigShapeError::WrongType { field: "currentVersion", .. }));

        let err = RolloutState::decode(
            &values(json!({"currentVersion": "vx", "replicaCount": "3"})),
            PathBuf::new(),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "release value \"replicaCount\" must be a non-negative integer, got string \"3\""
        );
    }

    #[test]
    fn test_negative_or_fractional_replica_count() {
        for bad in [json!(-1), json!(2.5)] {
            let err = RolloutState::decode(
                &values(json!({"currentVersion": "vx", "replicaCount": bad})),
                PathBuf::new(),
            )
            .unwrap_err();
            assert!(matches!(err, ConfigShapeError::WrongType { field: "replicaCount", .. }));
        }
    }

    #[test]
    fn test_unknown_variant_label() {
        let err = RolloutState::decode(
            &values(json!({"currentVersion": "vz", "replicaCount": 3})),
            PathBuf::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigShapeError::Invalid { field: "currentVersion", .. }));
    }
}
