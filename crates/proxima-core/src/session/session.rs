//! Session implementation - connection state machine
//!
//! The Session is the primary entry point for Proxima applications. It owns
//! the peer directory (through the discovery manager), the advertising
//! subscription and the single open connection, and serializes every
//! transition between them.
//!
//! # Example
//!
//! ```no_run
//! use proxima_core::session::{ConnectionRequest, Session};
//! use proxima_transport::MemoryRadio;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let radio = MemoryRadio::new();
//!     let session = Session::new(Arc::new(radio.endpoint("phone")))?;
//!
//!     session.discover().await?;
//!     session.connect(ConnectionRequest::new("Alice")).await?;
//!     session.send("hi").await?;
//!     session.disconnect(false).await?;
//!
//!     Ok(())
//! }
//! ```

use super::config::SessionConfig;
use super::error::{LinkError, Result};
use super::events::{LinkCounters, LinkStats, SessionEvent};
use super::state::{ConnectionMode, ConnectionRequest, LinkState};
use crate::connection::{Connection, ConnectionOrigin};
use crate::error::FrameError;
use proxima_discovery::{DiscoveryManager, InboundEvent, PeerRecord};
use proxima_transport::{PeerSocket, ProximityTransport};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};

/// Session inner state
pub(crate) struct SessionInner {
    /// Session configuration
    pub(crate) config: SessionConfig,
    /// Platform radio
    pub(crate) transport: Arc<dyn ProximityTransport>,
    /// Peer directory and advertising subscription
    pub(crate) discovery: DiscoveryManager,
    /// The single open connection
    pub(crate) connection: RwLock<Option<Arc<Connection>>>,
    /// Serializes connect, disconnect and inbound accept
    pub(crate) transition: Mutex<()>,
    /// An outbound connect is in progress
    pub(crate) connecting: AtomicBool,
    /// Bumped every time advertising starts or stops
    pub(crate) advertise_generation: AtomicU64,
    /// Listen loop armed flag
    pub(crate) listening: AtomicBool,
    /// Bumped every time a listen loop is armed
    pub(crate) listen_generation: AtomicU64,
    /// Source of connection identifiers
    pub(crate) next_connection_id: AtomicU64,
    /// Session event fan-out
    pub(crate) events: broadcast::Sender<SessionEvent>,
    /// Traffic counters
    pub(crate) counters: LinkCounters,
}

/// Proxima session
///
/// Holds at most one peer directory, one advertising subscription and one
/// connection. Cloning a session yields another handle to the same state.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

/// Resets the connecting flag when a connect attempt ends
struct ConnectingGuard<'a>(&'a AtomicBool);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructors
// ═══════════════════════════════════════════════════════════════════════════

impl Session {
    /// Create a session over a platform radio with the default configuration
    ///
    /// # Errors
    ///
    /// Never fails with the default configuration; the `Result` mirrors
    /// [`Session::with_config`].
    pub fn new(transport: Arc<dyn ProximityTransport>) -> Result<Self> {
        Self::with_config(transport, SessionConfig::default())
    }

    /// Create a session over a platform radio
    ///
    /// # Errors
    ///
    /// Returns `LinkError::InvalidConfig` if the configuration is invalid
    pub fn with_config(
        transport: Arc<dyn ProximityTransport>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let inner = SessionInner {
            discovery: DiscoveryManager::new(transport.clone()),
            transport,
            config,
            connection: RwLock::new(None),
            transition: Mutex::new(()),
            connecting: AtomicBool::new(false),
            advertise_generation: AtomicU64::new(0),
            listening: AtomicBool::new(false),
            listen_generation: AtomicU64::new(0),
            next_connection_id: AtomicU64::new(1),
            events,
            counters: LinkCounters::default(),
        };

        tracing::debug!("Session created for {}", inner.transport.display_name());
        Ok(Self {
            inner: Arc::new(inner),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Accessors
// ═══════════════════════════════════════════════════════════════════════════

impl Session {
    /// Name this session advertises under
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.inner.transport.display_name()
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current state.
    ///
    /// `Connected` wins over `Advertising` when both hold.
    pub async fn state(&self) -> LinkState {
        if self.current_connection().await.is_some() {
            LinkState::Connected
        } else if self.inner.connecting.load(Ordering::SeqCst) {
            LinkState::Connecting
        } else if self.inner.discovery.is_discovering() {
            LinkState::Discovering
        } else if self.inner.discovery.is_advertising().await {
            LinkState::Advertising
        } else {
            LinkState::Idle
        }
    }

    /// The open connection, if any
    pub async fn current_connection(&self) -> Option<Arc<Connection>> {
        self.inner.current_connection().await
    }

    /// Peer at the other end of the open connection
    pub async fn connected_peer(&self) -> Option<PeerRecord> {
        self.current_connection()
            .await
            .map(|conn| conn.peer().clone())
    }

    /// Latest discovery snapshot
    pub async fn peers(&self) -> Vec<PeerRecord> {
        self.inner.discovery.peers().await
    }

    /// Subscribe to session events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Traffic counters
    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.inner.counters.snapshot()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Discovery & Advertising
// ═══════════════════════════════════════════════════════════════════════════

impl Session {
    /// Take a discovery snapshot and make it the peer directory.
    ///
    /// # Errors
    ///
    /// Returns `NoDevicesFound` for an empty snapshot and `DiscoveryFailed`
    /// for a radio fault.
    pub async fn discover(&self) -> Result<Vec<PeerRecord>> {
        Ok(self.inner.discovery.discover().await?)
    }

    /// Become discoverable and accept inbound connections.
    ///
    /// Accepted connections replace the current one and are announced as
    /// [`SessionEvent::InboundConnected`]; failures as
    /// [`SessionEvent::InboundFailed`]. Calling this while already
    /// advertising does nothing.
    ///
    /// # Errors
    ///
    /// Returns `AdvertisingFailed` if the radio cannot advertise
    pub async fn start_advertising(&self) -> Result<()> {
        let _transition = self.inner.transition.lock().await;
        SessionInner::start_advertising_locked(&self.inner).await
    }

    /// Stop advertising. Idempotent.
    pub async fn stop_advertising(&self) {
        let _transition = self.inner.transition.lock().await;
        self.inner.stop_advertising_locked().await;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Connection Lifecycle
// ═══════════════════════════════════════════════════════════════════════════

impl Session {
    /// Open a connection to a peer from the latest discovery snapshot.
    ///
    /// The target is resolved by display name. A connection that is already
    /// open is released first, together with its listen loop; advertising is
    /// left as it is. A non-empty payload is sent as the first message.
    ///
    /// # Errors
    ///
    /// - `InvalidRequest` for an empty target
    /// - `PeerNotFound` if the target is not in the latest snapshot
    /// - `ConnectFailed` if the radio cannot open the connection
    /// - `SendFailed` if the first message cannot be written
    pub async fn connect(&self, request: ConnectionRequest) -> Result<()> {
        if request.target_address.is_empty() {
            return Err(LinkError::invalid_request("address is required"));
        }

        let peer = self
            .inner
            .discovery
            .lookup(&request.target_address)
            .await
            .ok_or_else(|| LinkError::PeerNotFound(request.target_address.clone()))?;

        {
            let _transition = self.inner.transition.lock().await;
            self.inner.connecting.store(true, Ordering::SeqCst);
            let _connecting = ConnectingGuard(&self.inner.connecting);

            let faults = self.inner.release_connection().await;
            if !faults.is_empty() {
                tracing::warn!(
                    "Previous connection released with {} fault(s)",
                    faults.len()
                );
            }

            tracing::info!(
                "Connecting to {} ({}, {})",
                peer.display_name,
                peer.host_address,
                request.mode
            );

            let socket = tokio::time::timeout(
                self.inner.config.connect_timeout,
                self.inner.open_socket(&peer, request.mode),
            )
            .await
            .map_err(|_| LinkError::connect_failed("timed out"))??;

            self.inner
                .install(
                    peer,
                    ConnectionOrigin::Outbound(request.mode),
                    request.keep_advertising_after_close,
                    socket,
                )
                .await;
        }

        if let Some(payload) = request.payload.filter(|p| !p.is_empty()) {
            self.send(&payload).await?;
        }

        Ok(())
    }

    /// Close the connection and stop advertising.
    ///
    /// Listening stops, then reader, writer and socket are released. Release
    /// always runs to completion. With `keep_advertising_after_close` the
    /// session advertises again afterwards. Disconnecting without a
    /// connection succeeds.
    ///
    /// # Errors
    ///
    /// Returns `DisconnectFailed` if any release step or re-advertising failed
    pub async fn disconnect(&self, keep_advertising_after_close: bool) -> Result<()> {
        let _transition = self.inner.transition.lock().await;

        self.inner.stop_advertising_locked().await;
        let faults = self.inner.release_connection().await;

        let mut problems: Vec<String> = faults.iter().map(ToString::to_string).collect();

        if keep_advertising_after_close {
            if let Err(e) = SessionInner::start_advertising_locked(&self.inner).await {
                problems.push(e.to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(LinkError::DisconnectFailed(problems.join("; ").into()))
        }
    }

    /// Send one message over the open connection.
    ///
    /// # Errors
    ///
    /// - `EmptyPayload` for an empty message, before any I/O
    /// - `NoConnection` if nothing is open
    /// - `SendFailed` if the frame cannot be written
    pub async fn send(&self, payload: &str) -> Result<()> {
        if payload.is_empty() {
            return Err(LinkError::EmptyPayload);
        }

        let conn = self
            .current_connection()
            .await
            .ok_or(LinkError::NoConnection)?;

        let written = conn
            .write_message(payload)
            .await
            .map_err(|e| LinkError::SendFailed(e.to_string().into()))?;

        self.inner.counters.sent(written);
        tracing::debug!("Sent {} bytes to {}", written, conn.peer().display_name);
        Ok(())
    }

    /// Shut the session down: stop advertising and release the connection.
    ///
    /// # Errors
    ///
    /// Returns `DisconnectFailed` if releasing the connection failed
    pub async fn close(&self) -> Result<()> {
        self.disconnect(false).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Internals
// ═══════════════════════════════════════════════════════════════════════════

impl SessionInner {
    pub(crate) async fn current_connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .read()
            .await
            .as_ref()
            .filter(|conn| !conn.is_closed())
            .cloned()
    }

    async fn open_socket(&self, peer: &PeerRecord, mode: ConnectionMode) -> Result<PeerSocket> {
        let opened = match mode {
            ConnectionMode::PhoneToPhone => {
                self.transport
                    .connect_peer(&peer.to_peer_information())
                    .await
            }
            ConnectionMode::PhoneToDevice => {
                if !peer.has_host() {
                    return Err(LinkError::connect_failed("peer has no host address"));
                }
                self.transport
                    .connect_host(&peer.host_address, peer.service_name.as_deref())
                    .await
            }
        };

        opened.map_err(|e| LinkError::ConnectFailed(e.to_string().into()))
    }

    /// Store a freshly opened socket as the session's connection.
    ///
    /// Caller holds the transition lock and has released any prior connection.
    async fn install(
        &self,
        peer: PeerRecord,
        origin: ConnectionOrigin,
        keep_advertising_after_close: bool,
        socket: PeerSocket,
    ) -> Arc<Connection> {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let conn = Arc::new(Connection::open(
            id,
            peer,
            origin,
            keep_advertising_after_close,
            socket,
            self.config.max_message_size,
        ));

        *self.connection.write().await = Some(conn.clone());
        self.counters.opened();

        tracing::info!(
            "Connection {} to {} open ({:?})",
            id,
            conn.peer().display_name,
            origin
        );
        conn
    }

    /// Drop listening and close the current connection, if any.
    ///
    /// Caller holds the transition lock.
    pub(crate) async fn release_connection(&self) -> Vec<FrameError> {
        self.listening.store(false, Ordering::SeqCst);

        let Some(conn) = self.connection.write().await.take() else {
            return Vec::new();
        };

        let faults = conn.close().await;
        for fault in &faults {
            tracing::warn!("Releasing connection {}: {}", conn.id(), fault);
        }
        tracing::info!(
            "Connection {} to {} released",
            conn.id(),
            conn.peer().display_name
        );
        faults
    }

    /// Start advertising and the inbound pump.
    ///
    /// Caller holds the transition lock.
    async fn start_advertising_locked(inner: &Arc<Self>) -> Result<()> {
        if inner.discovery.is_advertising().await {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(inner.config.event_channel_capacity);
        inner.discovery.start_advertising(tx).await?;

        let generation = inner.advertise_generation.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::spawn(Self::inbound_pump(Arc::downgrade(inner), generation, rx));
        Ok(())
    }

    /// Stop advertising and retire the running inbound pump.
    ///
    /// Caller holds the transition lock.
    pub(crate) async fn stop_advertising_locked(&self) {
        self.advertise_generation.fetch_add(1, Ordering::SeqCst);
        self.discovery.stop_advertising().await;
    }

    /// Installs accepted inbound sockets until advertising stops.
    ///
    /// Sockets still queued when their advertising subscription ends are
    /// closed instead of installed.
    async fn inbound_pump(
        inner: Weak<Self>,
        generation: u64,
        mut rx: mpsc::Receiver<InboundEvent>,
    ) {
        while let Some(event) = rx.recv().await {
            let Some(inner) = inner.upgrade() else {
                break;
            };

            match event {
                InboundEvent::Accepted { peer, socket } => {
                    let _transition = inner.transition.lock().await;
                    if inner.advertise_generation.load(Ordering::SeqCst) != generation {
                        tracing::debug!(
                            "Dropping inbound connection from {} accepted before advertising stopped",
                            peer.display_name
                        );
                        drop(socket);
                        continue;
                    }

                    inner.release_connection().await;
                    inner
                        .install(peer.clone(), ConnectionOrigin::Inbound, true, socket)
                        .await;
                    // No subscribers is fine
                    let _ = inner.events.send(SessionEvent::InboundConnected { peer });
                }
                InboundEvent::Failed { peer, error } => {
                    inner.counters.inbound_failed();
                    let error = LinkError::AcceptFailed(error.to_string().into());
                    let _ = inner.events.send(SessionEvent::InboundFailed { peer, error });
                }
            }
        }
        tracing::debug!("Inbound pump stopped");
    }
}
