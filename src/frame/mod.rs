//! Frame pipeline stages
//!
//! ```text
//!   RawFrame ──► FrameEncoder ──► EncodedFrame ──► LatestFrameSlot
//!  (any layout)  (RGB, overlay,    (jpeg + base64)   (newest only)
//!                 JPEG)                 │
//!                                       └──► FpsMeter::tick
//! ```

pub mod encoder;
pub mod fps;
pub mod overlay;
pub mod raw;
pub mod slot;

pub use encoder::{EncodedFrame, FrameEncoder, DEFAULT_JPEG_QUALITY};
pub use fps::FpsMeter;
pub use raw::{PixelLayout, RawFrame};
pub use slot::LatestFrameSlot;
