//! Emission loop
//!
//! Runs for the lifetime of the broadcaster. Every tick it reads the
//! latest-frame slot once and pushes that frame to every viewer. Nothing is
//! queued: a viewer that misses a tick gets the newer frame next time.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::MissedTickBehavior;

use super::Shared;
use crate::delivery::FrameSink;
use crate::frame::EncodedFrame;
use crate::registry::ClientId;

pub(super) async fn run(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let log_every = shared.config.emit_log_interval;
    let mut last_log: Option<Instant> = None;

    loop {
        ticker.tick().await;

        if !shared.run_state().is_live() {
            continue;
        }

        let viewers = shared.registry.read().await.viewers();
        if viewers.is_empty() {
            continue;
        }

        let log_due = last_log.map_or(true, |at| at.elapsed() >= log_every);

        match shared.slot.latest() {
            Some(frame) => {
                let (delivered, failed) = deliver_all(shared.sink.as_ref(), &viewers, &frame);
                shared.stats.record_deliveries(delivered, failed);

                if log_due {
                    tracing::info!(
                        viewers = viewers.len(),
                        frame_size = frame.payload_len(),
                        sequence = frame.sequence,
                        "Emitting frames"
                    );
                    last_log = Some(Instant::now());
                }
            }
            None => {
                if log_due {
                    tracing::warn!(viewers = viewers.len(), "No frames available to emit");
                    last_log = Some(Instant::now());
                }
            }
        }
    }
}

/// Push one frame to every viewer
///
/// Returns `(delivered, failed)`. A failure never stops the batch.
pub(super) fn deliver_all(
    sink: &dyn FrameSink,
    viewers: &[ClientId],
    frame: &EncodedFrame,
) -> (u64, u64) {
    let mut delivered = 0;
    let mut failed = 0;

    for viewer in viewers {
        match sink.deliver(viewer, frame) {
            Ok(()) => delivered += 1,
            Err(e) => {
                failed += 1;
                tracing::debug!(client = %viewer, error = %e, "Frame delivery failed");
            }
        }
    }

    (delivered, failed)
}
