use std::fmt;
use std::str::FromStr;

/// Number of traffic-shift steps in a rollout
pub const TRAFFIC_STEPS: u8 = 5;

/// Traffic moved to the target variant on every step (percent)
pub const STEP_WEIGHT: u8 = 20;

/// One of the two release slots taking part in a canary swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Vx,
    Vy,
}

impl Variant {
    pub const ALL: [Variant; 2] = [Variant::Vx, Variant::Vy];

    /// The other slot
    pub fn complement(self) -> Variant {
        match self {
            Variant::Vx => Variant::Vy,
            Variant::Vy => Variant::Vx,
        }
    }

    /// Label used as the values key for this slot
    pub fn label(self) -> &'static str {
        match self {
            Variant::Vx => "vx",
            Variant::Vy => "vy",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vx" => Ok(Variant::Vx),
            "vy" => Ok(Variant::Vy),
            other => Err(format!("unknown variant label {:?} (expected vx or vy)", other)),
        }
    }
}

/// Traffic weights for one step of the ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSplit {
    /// 1-based step number
    pub step: u8,
    /// Percent of traffic left on the current variant
    pub current_weight: u8,
    /// Percent of traffic sent to the target variant
    pub target_weight: u8,
}

impl TrafficSplit {
    /// Weights for `step`, or `None` outside `1..=TRAFFIC_STEPS`
    ///
    /// target = 20 * step, current = 100 - target.
    pub fn for_step(step: u8) -> Option<TrafficSplit> {
        if !(1..=TRAFFIC_STEPS).contains(&step) {
            return None;
        }
        let target_weight = STEP_WEIGHT * step;
        Some(TrafficSplit {
            step,
            current_weight: 100 - target_weight,
            target_weight,
        })
    }

    /// `--set` entry applying this split to the two variants
    pub fn set_value(&self, current: Variant, target: Variant) -> String {
        format!(
            "{}.trafficWeight={},{}.trafficWeight={}",
            current, self.current_weight, target, self.target_weight
        )
    }
}

/// Every step of the ramp, in order
pub fn traffic_schedule() -> impl Iterator<Item = TrafficSplit> {
    (1..=TRAFFIC_STEPS).filter_map(TrafficSplit::for_step)
}
