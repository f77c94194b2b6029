//! Broadcaster configuration

use std::time::Duration;

use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::source::SourceConfig;

/// Broadcaster configuration options
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Release the source when the last client disconnects
    pub power_save: bool,

    /// Capture width in pixels
    pub width: u32,

    /// Capture height in pixels
    pub height: u32,

    /// Target interval between frames, shared by capture and emission
    pub frame_interval: Duration,

    /// Number of internal capture buffers requested from the device
    pub buffer_count: u32,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,

    /// Draw the FPS indicator onto each frame
    pub fps_overlay: bool,

    /// Make every capture fail (exercises client placeholder handling)
    pub induce_malfunction: bool,

    /// Bound on opening and starting the source
    pub start_timeout: Duration,

    /// Bound on waiting for the capture loop to exit, and for the source to close
    pub stop_timeout: Duration,

    /// Sleep after a failed frame capture
    pub capture_backoff: Duration,

    /// Minimum interval between emission summary / warning logs
    pub emit_log_interval: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        let source = SourceConfig::default();
        Self {
            power_save: true,
            width: source.width,
            height: source.height,
            frame_interval: source.frame_interval, // ~30 fps
            buffer_count: source.buffer_count,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            fps_overlay: true,
            induce_malfunction: false,
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(1),
            capture_backoff: Duration::from_millis(100),
            emit_log_interval: Duration::from_secs(5),
        }
    }
}

impl BroadcasterConfig {
    /// Device settings derived from this configuration
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            width: self.width,
            height: self.height,
            frame_interval: self.frame_interval,
            buffer_count: self.buffer_count,
        }
    }

    /// Enable or disable power-save
    pub fn power_save(mut self, enabled: bool) -> Self {
        self.power_save = enabled;
        self
    }

    /// Set capture resolution
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set target frame interval
    pub fn frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Set capture buffer depth
    pub fn buffer_count(mut self, count: u32) -> Self {
        self.buffer_count = count.max(1);
        self
    }

    /// Set JPEG quality
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Disable the FPS overlay
    pub fn disable_fps_overlay(mut self) -> Self {
        self.fps_overlay = false;
        self
    }

    /// Enable or disable simulated capture failure
    pub fn induce_malfunction(mut self, enabled: bool) -> Self {
        self.induce_malfunction = enabled;
        self
    }

    /// Set the start bound
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Set the stop bound
    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Set the capture failure backoff
    pub fn capture_backoff(mut self, backoff: Duration) -> Self {
        self.capture_backoff = backoff;
        self
    }

    /// Set the emission log interval
    pub fn emit_log_interval(mut self, interval: Duration) -> Self {
        self.emit_log_interval = interval;
        self
    }
}
