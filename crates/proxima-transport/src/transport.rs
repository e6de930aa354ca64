//! Platform radio trait abstraction.
//!
//! This module defines the `ProximityTransport` trait that abstracts over the
//! proximity radio supplied by the platform (an in-memory radio, a TCP LAN
//! radio, or a real short-range adapter). The session layer drives discovery,
//! advertising and connect/accept exclusively through this trait.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// Platform fault code reported when the radio adapter is powered off.
pub const ADAPTER_OFF_FAULT: u32 = 0x8007_048F;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from the underlying socket
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Radio has been shut down
    #[error("Transport is closed")]
    Closed,

    /// Fault raised by the platform radio, identified by its fault code
    #[error("Platform fault 0x{code:08X}: {message}")]
    Platform {
        /// Platform-specific fault code
        code: u32,
        /// Human-readable description
        message: String,
    },

    /// Listener bind failed
    #[error("Failed to bind listener: {0}")]
    BindFailed(String),

    /// Connection attempt failed or was declined
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Target peer is not visible to the radio
    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    /// Inbound request ticket is unknown or already used
    #[error("Unknown connection request: {0}")]
    UnknownRequest(u64),

    /// The platform cannot show its radio settings screen
    #[error("Settings unavailable: {0}")]
    SettingsUnavailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransportError {
    /// Fault raised by every radio operation while the adapter is off
    #[must_use]
    pub fn adapter_off() -> Self {
        TransportError::Platform {
            code: ADAPTER_OFF_FAULT,
            message: "radio adapter is turned off".to_string(),
        }
    }

    /// Platform fault code, if this error carries one
    #[must_use]
    pub fn fault_code(&self) -> Option<u32> {
        match self {
            TransportError::Platform { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Byte stream usable in both directions.
///
/// Blanket-implemented for every `AsyncRead + AsyncWrite` stream, so radios can
/// hand out TCP streams, in-memory duplex pipes or platform sockets alike.
pub trait DuplexStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DuplexStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Open socket between two paired peers
pub type PeerSocket = Box<dyn DuplexStream>;

/// Peer as reported by a radio discovery snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInformation {
    /// Name the peer advertises itself under
    pub display_name: String,
    /// Host address, when the radio can resolve one
    pub host_name: Option<String>,
    /// Service identifier used for host-based connects
    pub service_name: Option<String>,
}

impl PeerInformation {
    /// Create peer information with only a display name
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            host_name: None,
            service_name: None,
        }
    }

    /// Attach a host address
    #[must_use]
    pub fn with_host(mut self, host_name: impl Into<String>) -> Self {
        self.host_name = Some(host_name.into());
        self
    }

    /// Attach a service identifier
    #[must_use]
    pub fn with_service(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }
}

impl fmt::Display for PeerInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host_name {
            Some(host) => write!(f, "{} ({})", self.display_name, host),
            None => write!(f, "{}", self.display_name),
        }
    }
}

/// Inbound connection request raised while advertising.
///
/// The request is completed by passing it back to
/// [`ProximityTransport::accept`]. A request that is never accepted leaves
/// the requester waiting until its own timeout.
#[derive(Debug)]
pub struct InboundRequest {
    /// Peer asking to connect
    pub peer: PeerInformation,
    ticket: u64,
}

impl InboundRequest {
    /// Create a request identified by a radio-local ticket
    #[must_use]
    pub fn new(peer: PeerInformation, ticket: u64) -> Self {
        Self { peer, ticket }
    }

    /// Radio-local ticket identifying the pending request
    #[must_use]
    pub fn ticket(&self) -> u64 {
        self.ticket
    }
}

/// Async proximity radio.
///
/// Implementations supply the discovery, advertising and connect primitives
/// of one platform radio. All methods are callable concurrently.
///
/// # Examples
///
/// ```no_run
/// use proxima_transport::{MemoryRadio, ProximityTransport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let radio = MemoryRadio::new();
/// let alice = radio.endpoint("alice");
/// let bob = radio.endpoint("bob");
///
/// bob.start().await?;
/// let peers = alice.find_all_peers().await?;
/// assert_eq!(peers[0].display_name, "bob");
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ProximityTransport: Send + Sync {
    /// Name this endpoint advertises itself under
    fn display_name(&self) -> &str;

    /// Make this endpoint discoverable and able to receive connection requests.
    ///
    /// # Errors
    /// Returns `TransportError` if the radio cannot start advertising
    async fn start(&self) -> TransportResult<()>;

    /// Stop advertising. Safe to call when not advertising.
    ///
    /// # Errors
    /// Returns `TransportError` if the radio faults while stopping
    async fn stop(&self) -> TransportResult<()>;

    /// Whether the endpoint is currently discoverable
    fn is_advertising(&self) -> bool;

    /// Take a snapshot of the peers currently visible to the radio.
    ///
    /// # Errors
    /// Returns `TransportError` on any radio fault; a powered-off adapter
    /// reports [`ADAPTER_OFF_FAULT`]
    async fn find_all_peers(&self) -> TransportResult<Vec<PeerInformation>>;

    /// Open a peer-to-peer connection to a discovered peer.
    ///
    /// # Errors
    /// Returns `TransportError` if the peer is unreachable or declines
    async fn connect_peer(&self, peer: &PeerInformation) -> TransportResult<PeerSocket>;

    /// Open a stream connection to a device by host address and service.
    ///
    /// # Errors
    /// Returns `TransportError` if no device answers at `host`
    async fn connect_host(&self, host: &str, service: Option<&str>)
    -> TransportResult<PeerSocket>;

    /// Register a fresh inbound request handler.
    ///
    /// Replaces any previously registered handler; the previous receiver is
    /// closed.
    fn subscribe_requests(&self) -> mpsc::Receiver<InboundRequest>;

    /// Complete an inbound connection request.
    ///
    /// # Errors
    /// Returns `TransportError` if the requester went away or the ticket is unknown
    async fn accept(&self, request: InboundRequest) -> TransportResult<PeerSocket>;

    /// Show the platform radio settings screen and wait until the user returns.
    ///
    /// # Errors
    /// Returns `TransportError::SettingsUnavailable` if the platform has none
    async fn open_settings(&self) -> TransportResult<()>;

    /// Get radio statistics
    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

/// Radio statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Discovery snapshots taken
    pub discovery_scans: u64,
    /// Outbound connections opened
    pub connections_opened: u64,
    /// Inbound requests accepted
    pub connections_accepted: u64,
    /// Connect or accept attempts that failed
    pub connect_failures: u64,
}

impl TransportStats {
    /// Create new empty statistics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovery snapshot
    pub fn record_scan(&mut self) {
        self.discovery_scans += 1;
    }

    /// Record an outbound connection
    pub fn record_open(&mut self) {
        self.connections_opened += 1;
    }

    /// Record an accepted inbound request
    pub fn record_accept(&mut self) {
        self.connections_accepted += 1;
    }

    /// Record a failed connect or accept
    pub fn record_failure(&mut self) {
        self.connect_failures += 1;
    }
}

/// Lock-free counters shared by the radio implementations
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    scans: AtomicU64,
    opened: AtomicU64,
    accepted: AtomicU64,
    failures: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn open(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn accept(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TransportStats {
        TransportStats {
            discovery_scans: self.scans.load(Ordering::Relaxed),
            connections_opened: self.opened.load(Ordering::Relaxed),
            connections_accepted: self.accepted.load(Ordering::Relaxed),
            connect_failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
