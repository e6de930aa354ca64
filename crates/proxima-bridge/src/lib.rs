//! # Proxima Bridge
//!
//! JSON command surface over a Proxima [`Session`](proxima_core::Session).
//!
//! Host applications name an action (`connect`, `send`, `read`, ...) and
//! pass JSON options; the bridge parses them into a [`Command`], runs it
//! against the session and answers with [`Reply`] values. `read` answers
//! with a [`ReadChannel`] that keeps producing replies while the listen
//! loop runs.
//!
//! ```no_run
//! use proxima_bridge::Bridge;
//! use proxima_core::Session;
//! use proxima_transport::MemoryRadio;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let radio = MemoryRadio::new();
//! let bridge = Bridge::new(Session::new(Arc::new(radio.endpoint("phone")))?);
//!
//! let outcome = bridge.handle("discoverDevices", "[]").await;
//! if let Some(reply) = outcome.into_reply() {
//!     println!("{}", serde_json::to_string(&reply)?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bridge;
pub mod command;
pub mod error;
pub mod reply;

pub use bridge::{Bridge, Outcome, ReadChannel};
pub use command::{Command, ConnectOptions, DisconnectOptions, SendOptions};
pub use error::BridgeError;
pub use reply::{PeerInfo, Reply, ReplyStatus};
