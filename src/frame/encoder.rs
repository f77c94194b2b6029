//! JPEG frame encoder
//!
//! Turns a [`RawFrame`] into an [`EncodedFrame`]: normalize to RGB, stamp the
//! FPS indicator, compress to JPEG and produce the base64 text form used by
//! text-only push transports.

use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use super::overlay::{draw_text, TextStyle};
use super::raw::RawFrame;
use crate::error::EncodeError;

/// Default JPEG quality
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// A delivery-ready frame
///
/// Cheap to clone: both payloads are reference counted.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// JPEG bytes
    pub jpeg: Bytes,
    /// Base64 (standard alphabet) encoding of `jpeg`
    pub base64: Arc<str>,
    /// Publication sequence number, assigned by the latest-frame slot
    pub sequence: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// When encoding finished
    pub encoded_at: Instant,
}

impl EncodedFrame {
    /// Size of the text payload in bytes
    pub fn payload_len(&self) -> usize {
        self.base64.len()
    }
}

/// Raw-to-JPEG encoder with an optional FPS overlay
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    quality: u8,
    overlay: Option<TextStyle>,
}

impl FrameEncoder {
    /// Create an encoder with the given quality (clamped to 1..=100)
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            overlay: Some(TextStyle::default()),
        }
    }

    /// Enable or disable the FPS overlay
    pub fn with_fps_overlay(mut self, enabled: bool) -> Self {
        self.overlay = enabled.then(TextStyle::default);
        self
    }

    /// JPEG quality in use
    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Whether the FPS overlay is drawn
    pub fn fps_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    /// Encode one raw frame
    ///
    /// `fps` is the value shown by the overlay. The returned frame has
    /// sequence 0 until it is published.
    pub fn encode(&self, raw: &RawFrame, fps: u32) -> Result<EncodedFrame, EncodeError> {
        let rgb = raw.to_rgb()?;
        let mut image = RgbImage::from_raw(raw.width, raw.height, rgb).ok_or(
            EncodeError::BufferSize {
                expected: raw.expected_len(),
                actual: raw.data.len(),
            },
        )?;

        if let Some(style) = &self.overlay {
            draw_text(&mut image, &format!("FPS: {}", fps), style);
        }

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&image)
            .map_err(|e| EncodeError::Jpeg(e.to_string()))?;

        let base64 = base64::engine::general_purpose::STANDARD.encode(&jpeg);

        Ok(EncodedFrame {
            jpeg: Bytes::from(jpeg),
            base64: Arc::from(base64),
            sequence: 0,
            width: raw.width,
            height: raw.height,
            encoded_at: Instant::now(),
        })
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}
