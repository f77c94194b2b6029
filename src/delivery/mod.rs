//! Push delivery to viewers
//!
//! The broadcaster does not own a transport. It hands each frame to a
//! [`FrameSink`], once per viewer, and never waits for acknowledgement.

pub mod channel;

use crate::error::DeliveryError;
use crate::frame::EncodedFrame;
use crate::registry::ClientId;

pub use channel::ChannelSink;

/// Fire-and-forget push primitive supplied by the transport layer
///
/// Implementations must not block: the emission loop calls `deliver` for
/// every viewer on every tick. A failure only affects that one viewer.
pub trait FrameSink: Send + Sync {
    /// Push `frame` to `client`
    fn deliver(&self, client: &ClientId, frame: &EncodedFrame) -> Result<(), DeliveryError>;
}
