//! Demand-driven live camera frame broadcaster
//!
//! `camcast` owns a single video source, keeps it open only while clients
//! are connected, encodes captured frames to JPEG and pushes the newest one
//! to every viewer on a fixed cadence.
//!
//! # Overview
//!
//! - [`Broadcaster`]: lifecycle manager. Feed it connect / disconnect /
//!   start-view / stop-view notifications from your transport.
//! - [`SourceProvider`] / [`FrameSource`]: the capture device. A
//!   [`TestPatternProvider`] is included for machines without a camera.
//! - [`FrameSink`]: how frames reach viewers. [`ChannelSink`] maps each client
//!   to a bounded `tokio::sync::mpsc` queue.
//!
//! Delivery favors recency over reliability: viewers always get the latest
//! frame, frames may be skipped, and nothing is retried.
//!
//! # Logging
//!
//! All events are emitted through `tracing`. Install a subscriber (for
//! example `tracing-subscriber` with `EnvFilter`) to see them.

pub mod broadcaster;
pub mod delivery;
pub mod error;
pub mod frame;
pub mod registry;
pub mod source;
pub mod stats;

pub use broadcaster::{Broadcaster, BroadcasterConfig, BroadcasterStatus, RunState};
pub use delivery::{ChannelSink, FrameSink};
pub use error::{DeliveryError, EncodeError, SourceError};
pub use frame::{EncodedFrame, PixelLayout, RawFrame};
pub use registry::{ClientEvent, ClientId};
pub use source::{FrameSource, SourceConfig, SourceProvider, TestPatternProvider};
pub use stats::StatsSnapshot;
