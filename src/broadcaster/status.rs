//! Status readout for health displays

use super::state::RunState;
use crate::stats::StatsSnapshot;

/// Point-in-time broadcaster status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcasterStatus {
    /// Source lifecycle phase
    pub run_state: RunState,
    /// Whether a capture session is live
    pub source_active: bool,
    /// Frames encoded in the last completed second
    pub fps: u32,
    /// Whether a frame is ready to send
    pub payload_available: bool,
    /// Whether power-save is on
    pub power_save: bool,
    /// Connected clients
    pub connected: usize,
    /// Viewing clients
    pub viewers: usize,
    /// Pipeline counters
    pub stats: StatsSnapshot,
}

impl BroadcasterStatus {
    /// Whether the broadcaster is serving frames to at least one viewer
    pub fn is_streaming(&self) -> bool {
        self.source_active && self.payload_available && self.viewers > 0
    }
}
