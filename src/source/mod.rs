//! Video source abstraction
//!
//! A [`SourceProvider`] opens and configures the device; the resulting
//! [`FrameSource`] is the source handle owned by the broadcaster for the
//! duration of one capture session. All methods are blocking and are called
//! from the tokio blocking pool.

pub mod test_pattern;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::error::SourceError;
use crate::frame::RawFrame;

pub use test_pattern::{TestPatternProvider, TestPatternSource};

/// Device settings requested when a source is acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceConfig {
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Target interval between frames
    pub frame_interval: Duration,
    /// Number of internal capture buffers
    pub buffer_count: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_interval: Duration::from_micros(33_333),
            buffer_count: 4,
        }
    }
}

/// An open, configured capture device
pub trait FrameSource: Send {
    /// Begin streaming
    fn start(&mut self) -> Result<(), SourceError>;

    /// Read one frame
    fn capture(&mut self) -> Result<RawFrame, SourceError>;

    /// Stop streaming and close the device
    fn stop(&mut self) -> Result<(), SourceError>;
}

/// Factory for source handles
pub trait SourceProvider: Send + Sync {
    /// Open the device and apply `config`
    fn acquire(&self, config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError>;
}

/// Source handle shared between the lifecycle manager and one capture loop
///
/// The manager releases the handle by taking it out; a capture loop that
/// outlived its session then finds the slot empty and gets
/// [`SourceError::Released`] instead of touching a closed device.
#[derive(Clone)]
pub(crate) struct SharedSource {
    inner: Arc<Mutex<Option<Box<dyn FrameSource>>>>,
}

impl SharedSource {
    pub(crate) fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(source))),
        }
    }

    /// Capture one frame; blocks while another call holds the device
    pub(crate) fn capture(&self) -> Result<RawFrame, SourceError> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(source) => source.capture(),
            None => Err(SourceError::Released),
        }
    }

    /// Take the handle out and close it
    ///
    /// Returns `None` if it was already released.
    pub(crate) fn release(&self) -> Option<Result<(), SourceError>> {
        let taken = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        taken.map(|mut source| source.stop())
    }

    #[cfg(test)]
    pub(crate) fn is_released(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
