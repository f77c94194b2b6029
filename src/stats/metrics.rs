//! Counters for the capture and emission pipelines

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, updated by the capture and emission loops
#[derive(Debug, Default)]
pub struct CaptureStats {
    sessions_started: AtomicU64,
    acquire_failures: AtomicU64,
    frames_encoded: AtomicU64,
    capture_failures: AtomicU64,
    encode_failures: AtomicU64,
    frames_delivered: AtomicU64,
    delivery_failures: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_acquire_failure(&self) {
        self.acquire_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_encoded(&self) {
        self.frames_encoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_capture_failure(&self) {
        self.capture_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deliveries(&self, delivered: u64, failed: u64) {
        self.frames_delivered.fetch_add(delivered, Ordering::Relaxed);
        self.delivery_failures.fetch_add(failed, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            acquire_failures: self.acquire_failures.load(Ordering::Relaxed),
            frames_encoded: self.frames_encoded.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`CaptureStats`] at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Capture sessions started (successful source acquisitions)
    pub sessions_started: u64,
    /// Source acquisitions that failed
    pub acquire_failures: u64,
    /// Frames successfully encoded and published
    pub frames_encoded: u64,
    /// Frame reads that failed
    pub capture_failures: u64,
    /// Frames dropped by the encoder
    pub encode_failures: u64,
    /// Per-viewer pushes that succeeded
    pub frames_delivered: u64,
    /// Per-viewer pushes that failed
    pub delivery_failures: u64,
}
