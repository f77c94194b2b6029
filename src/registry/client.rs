//! Client identifiers

use std::sync::Arc;

/// Opaque per-connection token supplied by the transport layer
///
/// Cheap to clone; the inner string is reference counted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Arc<str>);

impl ClientId {
    /// Create a new client id
    pub fn new(id: impl Into<String>) -> Self {
        Self(Arc::from(id.into()))
    }

    /// Borrow the raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// Connection lifecycle notification from the transport layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Client opened a connection
    Connected(ClientId),
    /// Client closed its connection
    Disconnected(ClientId),
    /// Client asked to receive pushed frames
    StartViewing(ClientId),
    /// Client no longer wants pushed frames
    StopViewing(ClientId),
}

impl ClientEvent {
    /// The client this event concerns
    pub fn client(&self) -> &ClientId {
        match self {
            ClientEvent::Connected(id)
            | ClientEvent::Disconnected(id)
            | ClientEvent::StartViewing(id)
            | ClientEvent::StopViewing(id) => id,
        }
    }
}
