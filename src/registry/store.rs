//! Client registry implementation
//!
//! Plain data structure; the broadcaster wraps it in a `tokio::sync::RwLock`
//! and holds the lock only for the duration of a single mutation or read.

use std::collections::HashSet;

use super::client::ClientId;

/// Outcome of a start-viewing request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChange {
    /// Client was added to the viewer set
    Added,
    /// Client was already viewing
    Unchanged,
    /// Client is not connected, request ignored
    NotConnected,
}

/// Connected clients and the viewing subset
#[derive(Debug, Default)]
pub struct ClientRegistry {
    connected: HashSet<ClientId>,
    viewers: HashSet<ClientId>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connected client
    ///
    /// Returns `false` if the client was already connected.
    pub fn connect(&mut self, id: ClientId) -> bool {
        self.connected.insert(id)
    }

    /// Remove a client from both the connected and the viewer sets
    ///
    /// Returns `false` if the client was not connected.
    pub fn disconnect(&mut self, id: &ClientId) -> bool {
        self.viewers.remove(id);
        self.connected.remove(id)
    }

    /// Add a connected client to the viewer set
    pub fn start_viewing(&mut self, id: &ClientId) -> ViewChange {
        if !self.connected.contains(id) {
            return ViewChange::NotConnected;
        }

        if self.viewers.insert(id.clone()) {
            ViewChange::Added
        } else {
            ViewChange::Unchanged
        }
    }

    /// Remove a client from the viewer set
    ///
    /// Returns `false` if the client was not viewing.
    pub fn stop_viewing(&mut self, id: &ClientId) -> bool {
        self.viewers.remove(id)
    }

    /// Number of connected clients
    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    /// Number of viewing clients
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Whether no client is connected
    pub fn is_empty(&self) -> bool {
        self.connected.is_empty()
    }

    /// Check if a client is connected
    pub fn is_connected(&self, id: &ClientId) -> bool {
        self.connected.contains(id)
    }

    /// Check if a client is viewing
    pub fn is_viewing(&self, id: &ClientId) -> bool {
        self.viewers.contains(id)
    }

    /// Snapshot of the viewer set for fan-out
    pub fn viewers(&self) -> Vec<ClientId> {
        self.viewers.iter().cloned().collect()
    }

    /// Whether the viewer set is a subset of the connected set
    pub fn viewers_are_connected(&self) -> bool {
        self.viewers.is_subset(&self.connected)
    }
}
