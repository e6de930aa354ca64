//! # Proxima Core
//!
//! Connection state machine and message framing for Proxima, a short-range
//! peer-to-peer link between nearby devices.
//!
//! This crate provides:
//! - Length-prefixed UTF-8 message framing
//! - The single open connection and its ordered release
//! - The session state machine (discover, advertise, connect, send, listen)
//! - Error types and handling
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Session                                  │
//! │   (at most one open connection, serialized transitions)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Connection                               │
//! │   (paired socket split into framed reader and writer)           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Frames                                   │
//! │   ([i32 LE byte length][UTF-8 payload])                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod connection;
pub mod error;
pub mod frame;
pub mod session;

pub use connection::{Connection, ConnectionOrigin};
pub use error::FrameError;
pub use frame::{
    DEFAULT_MAX_MESSAGE_SIZE, LENGTH_PREFIX_SIZE, MessageReader, MessageWriter, decode_frame,
    encode_frame,
};
pub use session::{
    ConnectionMode, ConnectionRequest, ErrorKind, LinkError, LinkState, LinkStats, ListenEvent,
    MessageStream, Session, SessionConfig, SessionEvent,
};

/// Adapter power state as reported by the radio probe
pub use proxima_discovery::AdapterState;
