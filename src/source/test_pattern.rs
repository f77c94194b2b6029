//! Synthetic test-pattern source
//!
//! Produces a diagonal gradient that scrolls one pixel per frame. Useful for
//! running the broadcaster on machines without a camera.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use super::{FrameSource, SourceConfig, SourceProvider};
use crate::error::SourceError;
use crate::frame::{PixelLayout, RawFrame};

/// Provider that always succeeds with a [`TestPatternSource`]
#[derive(Debug, Default)]
pub struct TestPatternProvider {
    acquisitions: AtomicU64,
}

impl TestPatternProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sources handed out so far
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}

impl SourceProvider for TestPatternProvider {
    fn acquire(&self, config: &SourceConfig) -> Result<Box<dyn FrameSource>, SourceError> {
        if config.width == 0 || config.height == 0 {
            return Err(SourceError::Configure(format!(
                "unsupported resolution {}x{}",
                config.width, config.height
            )));
        }

        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(TestPatternSource::new(config.width, config.height)))
    }
}

/// Scrolling gradient generator
#[derive(Debug)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    frame_index: u32,
    running: bool,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
            running: false,
        }
    }
}

impl FrameSource for TestPatternSource {
    fn start(&mut self) -> Result<(), SourceError> {
        self.running = true;
        Ok(())
    }

    fn capture(&mut self) -> Result<RawFrame, SourceError> {
        if !self.running {
            return Err(SourceError::Capture("source not started".into()));
        }

        let offset = self.frame_index;
        self.frame_index = self.frame_index.wrapping_add(1);

        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                let v = x.wrapping_add(y).wrapping_add(offset);
                data.extend_from_slice(&[v as u8, (v >> 1) as u8, 255 - v as u8]);
            }
        }

        Ok(RawFrame::new(
            self.width,
            self.height,
            PixelLayout::Rgb24,
            Bytes::from(data),
        ))
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        self.running = false;
        Ok(())
    }
}
