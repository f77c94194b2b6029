//! Client registry for demand tracking
//!
//! The registry records which clients are connected and which of those are
//! currently viewing. The connected count drives the source lifecycle
//! (power-save), while the viewer set is the fan-out list for emission.
//!
//! ```text
//!        connected: {a, b, c}          viewers: {a, c}
//!   ┌──────────────────────────┐     ┌──────────────┐
//!   │ connect / disconnect     │ ──► │ start_view / │
//!   │ (lifecycle manager)      │     │ stop_view    │
//!   └──────────────────────────┘     └──────┬───────┘
//!                                           │
//!                                  emission loop fan-out
//! ```
//!
//! Viewers are always a subset of connected clients: disconnecting a client
//! drops its viewing state too, and viewing requests from unknown clients are
//! refused.

pub mod client;
pub mod store;

pub use client::{ClientEvent, ClientId};
pub use store::{ClientRegistry, ViewChange};
