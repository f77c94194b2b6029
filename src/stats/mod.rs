//! Broadcaster statistics

pub mod metrics;

pub use metrics::{CaptureStats, StatsSnapshot};
