//! Latest-frame slot
//!
//! Single-writer / multi-reader holder for the newest encoded frame. Writes
//! replace the whole `Arc`, so a reader sees either the previous frame or the
//! new one, never a partially written one. Older frames are simply dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;

use super::encoder::EncodedFrame;

/// Overwrite-on-write holder for the most recent frame
#[derive(Debug, Default)]
pub struct LatestFrameSlot {
    frame: ArcSwapOption<EncodedFrame>,
    /// Last sequence number handed out
    sequence: AtomicU64,
}

impl LatestFrameSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a frame, replacing whatever was there
    ///
    /// Stamps the frame with the next sequence number and returns it.
    pub fn publish(&self, mut frame: EncodedFrame) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        frame.sequence = sequence;
        self.frame.store(Some(Arc::new(frame)));
        sequence
    }

    /// Current frame, if any
    pub fn latest(&self) -> Option<Arc<EncodedFrame>> {
        self.frame.load_full()
    }

    /// Whether a frame is available
    pub fn is_available(&self) -> bool {
        self.frame.load().is_some()
    }

    /// Sequence number of the last published frame (0 if none ever)
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Drop the current frame
    ///
    /// The sequence counter keeps counting so freshness stays monotonic
    /// across capture sessions.
    pub fn clear(&self) {
        self.frame.store(None);
    }
}
