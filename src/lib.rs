//! helm-canary: scripted canary upgrades between two chart release slots
//!
//! The rollout driver lives in [`rollout`]; everything it talks to sits behind
//! a trait so it can be swapped for an in-memory double in tests:
//! - [`release::ReleaseClient`] for release content, updates and status
//! - [`chart::ChartResolver`] for locating the chart archive or directory
//! - [`pause::Pause`] for the settling delay between phases

pub mod chart;
pub mod cli;
pub mod config;
pub mod pause;
pub mod release;
pub mod rollout;
pub mod transport;
pub mod values;
