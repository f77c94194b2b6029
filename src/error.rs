//! Error types
//!
//! Every failure in the broadcaster is absorbed and logged where it happens;
//! these types exist so the individual stages can report *what* went wrong.

use crate::registry::ClientId;

/// Errors raised by a video source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The device could not be opened (busy, missing, no permission)
    Unavailable(String),
    /// The device rejected the requested configuration
    Configure(String),
    /// A single frame could not be read
    Capture(String),
    /// The source was released while a capture loop still referenced it
    Released,
    /// Capture failure injected by the malfunction switch
    Simulated,
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Unavailable(msg) => write!(f, "source unavailable: {}", msg),
            SourceError::Configure(msg) => write!(f, "source configuration failed: {}", msg),
            SourceError::Capture(msg) => write!(f, "frame capture failed: {}", msg),
            SourceError::Released => write!(f, "source already released"),
            SourceError::Simulated => write!(f, "simulated stream malfunction"),
        }
    }
}

impl std::error::Error for SourceError {}

/// Errors raised while turning a raw frame into JPEG
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Width or height is zero
    EmptyFrame,
    /// Pixel buffer does not match `width * height * channels`
    BufferSize { expected: usize, actual: usize },
    /// The JPEG codec rejected the image
    Jpeg(String),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::EmptyFrame => write!(f, "frame has zero width or height"),
            EncodeError::BufferSize { expected, actual } => write!(
                f,
                "pixel buffer size mismatch: expected {} bytes, got {}",
                expected, actual
            ),
            EncodeError::Jpeg(msg) => write!(f, "JPEG encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for EncodeError {}

/// Errors raised when pushing a frame to one viewer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// The transport has no endpoint for this client
    UnknownClient(ClientId),
    /// The client's endpoint has gone away
    Closed(ClientId),
    /// The client's outbound queue is full; the frame was dropped
    Full(ClientId),
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::UnknownClient(id) => write!(f, "no endpoint for client: {}", id),
            DeliveryError::Closed(id) => write!(f, "client endpoint closed: {}", id),
            DeliveryError::Full(id) => write!(f, "client queue full: {}", id),
        }
    }
}

impl std::error::Error for DeliveryError {}
