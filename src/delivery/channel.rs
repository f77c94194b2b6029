//! In-process channel transport
//!
//! Each client gets a bounded `mpsc` queue. When a client falls behind its
//! queue fills up and new frames are dropped for that client only, so slow
//! readers skip frames instead of accumulating latency.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::mpsc::{self, error::TrySendError};

use super::FrameSink;
use crate::error::DeliveryError;
use crate::frame::EncodedFrame;
use crate::registry::ClientId;

/// Default per-client queue depth
pub const DEFAULT_QUEUE_DEPTH: usize = 2;

/// [`FrameSink`] backed by per-client bounded channels
#[derive(Debug, Default)]
pub struct ChannelSink {
    endpoints: RwLock<HashMap<ClientId, mpsc::Sender<EncodedFrame>>>,
}

impl ChannelSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an endpoint for `client` with the default queue depth
    pub fn register(&self, client: ClientId) -> mpsc::Receiver<EncodedFrame> {
        self.register_with_depth(client, DEFAULT_QUEUE_DEPTH)
    }

    /// Open an endpoint for `client`, replacing any previous one
    pub fn register_with_depth(
        &self,
        client: ClientId,
        depth: usize,
    ) -> mpsc::Receiver<EncodedFrame> {
        let (tx, rx) = mpsc::channel(depth.max(1));
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client, tx);
        rx
    }

    /// Close the endpoint for `client`
    pub fn unregister(&self, client: &ClientId) -> bool {
        self.endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(client)
            .is_some()
    }

    /// Number of open endpoints
    pub fn endpoint_count(&self) -> usize {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl FrameSink for ChannelSink {
    fn deliver(&self, client: &ClientId, frame: &EncodedFrame) -> Result<(), DeliveryError> {
        let endpoints = self.endpoints.read().unwrap_or_else(PoisonError::into_inner);
        let tx = endpoints
            .get(client)
            .ok_or_else(|| DeliveryError::UnknownClient(client.clone()))?;

        tx.try_send(frame.clone()).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full(client.clone()),
            TrySendError::Closed(_) => DeliveryError::Closed(client.clone()),
        })
    }
}
