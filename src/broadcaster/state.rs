//! Source run state
//!
//! ```text
//!   Idle ──► Starting ──► Running ──► Stopping ──► Idle
//!              │                                    ▲
//!              └────────── acquire failed ──────────┘
//! ```

/// Lifecycle phase of the video source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// No source handle held
    #[default]
    Idle,
    /// Acquiring and starting the source
    Starting,
    /// Source open, capture loop running
    Running,
    /// Capture loop signalled, source being released
    Stopping,
}

impl RunState {
    /// Whether frames may currently be produced
    pub fn is_live(self) -> bool {
        matches!(self, RunState::Starting | RunState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
