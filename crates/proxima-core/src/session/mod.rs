//! Session layer for Proxima
//!
//! This module provides the high-level `Session` API that coordinates the
//! pieces below it:
//! - Peer discovery and advertising (via proxima-discovery)
//! - Socket pairing (via the proxima-transport radio)
//! - The single open connection and its message framing
//! - The listen loop that streams incoming messages
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Session API                         │
//! │   (connect / disconnect / send / listen / advertise)     │
//! ├─────────────────────────────────────────────────────────┤
//! │  Discovery  │  Connection  │  Listen Loop  │  Adapter    │
//! ├─────────────────────────────────────────────────────────┤
//! │                 ProximityTransport radio                 │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod adapter;
pub mod config;
pub mod error;
pub mod events;
mod listen;
#[allow(clippy::module_inception)]
pub mod session;
pub mod state;

pub use config::SessionConfig;
pub use error::{ErrorKind, LinkError, Result};
pub use events::{LinkStats, ListenEvent, MessageStream, SessionEvent};
pub use session::Session;
pub use state::{ConnectionMode, ConnectionRequest, LinkState};
