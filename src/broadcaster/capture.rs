//! Capture loop
//!
//! One task per capture session. It is the only writer of the latest-frame
//! slot. Device reads and JPEG encoding are blocking, so each step runs on
//! the blocking pool while the loop itself stays on the async executor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::Shared;
use crate::error::SourceError;
use crate::source::SharedSource;

/// Result of one capture attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    /// Frame encoded and published with this sequence number
    Published(u64),
    /// Frame read but not published (encode failure or stop raced in)
    Skipped,
    /// Frame read failed
    CaptureFailed,
    /// Source handle released underneath this loop
    Released,
}

pub(super) async fn run(
    shared: Arc<Shared>,
    generation: u64,
    stop: Arc<AtomicBool>,
    source: SharedSource,
) {
    let interval = shared.config.frame_interval;
    tracing::debug!(generation = generation, "Capture loop started");

    loop {
        // Single exit point per iteration
        if stop.load(Ordering::Acquire) || shared.closed.load(Ordering::Acquire) {
            break;
        }

        if shared.connected_count().await == 0 {
            tokio::time::sleep(interval).await;
            continue;
        }

        let started = Instant::now();
        let pause = match step(&shared, &stop, &source).await {
            Step::Published(sequence) => {
                tracing::trace!(sequence = sequence, "Frame published");
                remaining(interval, started)
            }
            Step::Skipped => remaining(interval, started),
            Step::CaptureFailed => shared.config.capture_backoff.max(remaining(interval, started)),
            Step::Released => break,
        };

        tokio::time::sleep(pause).await;
    }

    // A newer session owns the flag once the generation has moved on
    if shared.generation.load(Ordering::Acquire) == generation {
        shared.source_active.store(false, Ordering::Release);
    }
    tracing::debug!(generation = generation, "Capture loop exited");
}

fn remaining(interval: Duration, started: Instant) -> Duration {
    interval.saturating_sub(started.elapsed())
}

async fn step(shared: &Arc<Shared>, stop: &AtomicBool, source: &SharedSource) -> Step {
    let malfunction = shared.induce_malfunction.load(Ordering::Relaxed);
    let fps = shared.fps.current_fps();

    let worker = Arc::clone(shared);
    let device = source.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        if malfunction {
            return Err(SourceError::Simulated);
        }
        let raw = device.capture()?;
        Ok(worker.encoder.encode(&raw, fps))
    })
    .await;

    match outcome {
        Ok(Ok(Ok(frame))) => {
            if stop.load(Ordering::Acquire) {
                return Step::Skipped;
            }

            let sequence = shared.slot.publish(frame);
            shared.stats.record_frame_encoded();
            if let Some(fps) = shared.fps.tick() {
                tracing::debug!(fps = fps, "Capture rate");
            }
            Step::Published(sequence)
        }
        Ok(Ok(Err(e))) => {
            // Previous frame stays published
            tracing::error!(error = %e, "Failed to encode frame");
            shared.stats.record_encode_failure();
            Step::Skipped
        }
        Ok(Err(SourceError::Released)) => Step::Released,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Failed to capture frame");
            shared.stats.record_capture_failure();
            Step::CaptureFailed
        }
        Err(e) => {
            tracing::error!(error = %e, "Capture task panicked");
            shared.stats.record_capture_failure();
            Step::CaptureFailed
        }
    }
}
