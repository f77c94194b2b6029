//! Frames-per-second meter
//!
//! Counts frames per whole wall-clock second. Written by the capture loop
//! only; read from anywhere. A one-frame race at a second boundary is
//! tolerated.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-second frame counter
#[derive(Debug, Default)]
pub struct FpsMeter {
    /// Frames counted in the current second
    frames_this_second: AtomicU32,
    /// Current second (Unix time)
    current_second: AtomicU64,
    /// Frames counted in the last completed second
    current_fps: AtomicU32,
}

impl FpsMeter {
    /// Create a meter reading 0 fps
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame at the current wall-clock time
    ///
    /// Returns `Some(fps)` when a second boundary was crossed.
    pub fn tick(&self) -> Option<u32> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.tick_at(now)
    }

    /// Record one frame at the given Unix second
    pub fn tick_at(&self, second: u64) -> Option<u32> {
        let mut rolled = None;

        if self.current_second.load(Ordering::Relaxed) != second {
            self.current_second.store(second, Ordering::Relaxed);
            let completed = self.frames_this_second.swap(0, Ordering::Relaxed);
            self.current_fps.store(completed, Ordering::Relaxed);
            rolled = Some(completed);
        }

        self.frames_this_second.fetch_add(1, Ordering::Relaxed);
        rolled
    }

    /// Frames counted in the last completed second
    pub fn current_fps(&self) -> u32 {
        self.current_fps.load(Ordering::Relaxed)
    }

    /// Reset to 0 fps (new capture session)
    pub fn reset(&self) {
        self.frames_this_second.store(0, Ordering::Relaxed);
        self.current_second.store(0, Ordering::Relaxed);
        self.current_fps.store(0, Ordering::Relaxed);
    }
}
