//! # Proxima Discovery
//!
//! Peer discovery layer for the Proxima messaging stack.
//!
//! This crate provides:
//! - `PeerDirectory`, the single most-recent discovery snapshot
//! - `DiscoveryManager`, which drives discovery snapshots and the advertising
//!   subscription (becoming discoverable and accepting inbound requests)
//! - `AdapterState`, the best-effort adapter power probe
//!
//! ## Example
//!
//! ```rust,no_run
//! use proxima_discovery::DiscoveryManager;
//! use proxima_transport::MemoryRadio;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let radio = MemoryRadio::new();
//! let manager = DiscoveryManager::new(Arc::new(radio.endpoint("alice")));
//!
//! for peer in manager.discover().await? {
//!     println!("{} at {}", peer.display_name, peer.host_address);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod directory;
pub mod manager;

pub use adapter::AdapterState;
pub use directory::{PeerDirectory, PeerRecord, UNKNOWN_HOST};
pub use manager::{DiscoveryError, DiscoveryManager, InboundEvent};
