//! Raw captured frames

use bytes::Bytes;

use crate::error::EncodeError;

/// Channel order of a raw pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// 3 bytes per pixel, red first
    Rgb24,
    /// 3 bytes per pixel, blue first
    Bgr24,
    /// 4 bytes per pixel, red first, trailing alpha
    Rgba32,
    /// 4 bytes per pixel, blue first, trailing alpha
    Bgra32,
}

impl PixelLayout {
    /// Bytes per pixel
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Rgb24 | PixelLayout::Bgr24 => 3,
            PixelLayout::Rgba32 | PixelLayout::Bgra32 => 4,
        }
    }

    /// Whether the first channel is blue
    pub fn is_bgr(self) -> bool {
        matches!(self, PixelLayout::Bgr24 | PixelLayout::Bgra32)
    }
}

/// One frame as delivered by a video source
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Channel order of `data`
    pub layout: PixelLayout,
    /// Tightly packed pixel rows
    pub data: Bytes,
}

impl RawFrame {
    /// Create a raw frame
    pub fn new(width: u32, height: u32, layout: PixelLayout, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            layout,
            data: data.into(),
        }
    }

    /// Expected buffer length for the declared shape
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.channels()
    }

    /// Check the buffer against the declared shape
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::EmptyFrame);
        }

        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(EncodeError::BufferSize {
                expected,
                actual: self.data.len(),
            });
        }

        Ok(())
    }

    /// Convert to packed RGB, shuffling channels only when needed
    pub fn to_rgb(&self) -> Result<Vec<u8>, EncodeError> {
        self.validate()?;

        let rgb = match self.layout {
            PixelLayout::Rgb24 => self.data.to_vec(),
            PixelLayout::Bgr24 => self
                .data
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelLayout::Rgba32 => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            PixelLayout::Bgra32 => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
        };

        Ok(rgb)
    }
}
