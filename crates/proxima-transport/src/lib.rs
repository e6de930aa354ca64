//! # Proxima Transport
//!
//! Radio layer for the Proxima proximity messaging stack.
//!
//! This crate provides:
//! - The `ProximityTransport` trait every platform radio implements
//! - `PeerSocket`, the duplex byte stream a radio hands out once two peers pair
//! - `MemoryRadio`, an in-process radio for tests and single-process demos
//! - `TcpRadio`, a LAN radio that advertises on a TCP listener
//!
//! The radio is deliberately opaque: discovery snapshots, inbound connection
//! requests and connect primitives are all a platform concern. Everything above
//! this crate only sees `PeerInformation` records and `PeerSocket` streams.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod tcp;
pub mod transport;

pub use memory::{MemoryRadio, MemoryTransport};
pub use tcp::{DEFAULT_PORT, TcpPeer, TcpRadio, TcpRadioConfig};
pub use transport::{
    ADAPTER_OFF_FAULT, DuplexStream, InboundRequest, PeerInformation, PeerSocket,
    ProximityTransport, TransportError, TransportResult, TransportStats,
};
