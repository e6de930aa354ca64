//! Discovery Manager
//!
//! Drives discovery snapshots and the advertising subscription on top of a
//! platform radio. The manager owns the peer directory and at most one
//! advertising subscription; accepted inbound sockets are handed to the
//! caller through an mpsc channel.

use crate::adapter::AdapterState;
use crate::directory::{PeerDirectory, PeerRecord};
use proxima_transport::{PeerSocket, ProximityTransport, TransportError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

/// Discovery manager errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Discovery completed but no peer was visible
    #[error("No devices were found")]
    NoDevicesFound,

    /// Radio faulted during discovery
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(#[source] TransportError),

    /// Radio faulted while starting to advertise
    #[error("Advertising failed: {0}")]
    AdvertisingFailed(#[source] TransportError),
}

impl DiscoveryError {
    /// Platform fault code of the underlying radio error, if any
    #[must_use]
    pub fn fault_code(&self) -> Option<u32> {
        match self {
            DiscoveryError::NoDevicesFound => None,
            DiscoveryError::DiscoveryFailed(e) | DiscoveryError::AdvertisingFailed(e) => {
                e.fault_code()
            }
        }
    }
}

/// Outcome of one inbound connection request
pub enum InboundEvent {
    /// The request was accepted and a socket is open
    Accepted {
        /// Requesting peer
        peer: PeerRecord,
        /// Open socket to the peer
        socket: PeerSocket,
    },
    /// The request could not be completed
    Failed {
        /// Requesting peer
        peer: PeerRecord,
        /// Radio fault
        error: TransportError,
    },
}

impl fmt::Debug for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InboundEvent::Accepted { peer, .. } => f
                .debug_struct("Accepted")
                .field("peer", peer)
                .finish_non_exhaustive(),
            InboundEvent::Failed { peer, error } => f
                .debug_struct("Failed")
                .field("peer", peer)
                .field("error", error)
                .finish(),
        }
    }
}

/// Active advertising registration
struct AdvertisingSubscription {
    accept_task: JoinHandle<()>,
    started_at: Instant,
}

impl Drop for AdvertisingSubscription {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Clears the discovering flag when a discovery call finishes or is cancelled
struct DiscoveringGuard<'a>(&'a AtomicBool);

impl Drop for DiscoveringGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Discovery and advertising engine
pub struct DiscoveryManager {
    /// Platform radio
    transport: Arc<dyn ProximityTransport>,
    /// Latest discovery snapshot
    directory: RwLock<PeerDirectory>,
    /// Advertising slot
    advertising: Mutex<Option<AdvertisingSubscription>>,
    /// Whether a discovery call is in flight
    discovering: AtomicBool,
}

impl DiscoveryManager {
    /// Create a manager over a platform radio
    #[must_use]
    pub fn new(transport: Arc<dyn ProximityTransport>) -> Self {
        Self {
            transport,
            directory: RwLock::new(PeerDirectory::new()),
            advertising: Mutex::new(None),
            discovering: AtomicBool::new(false),
        }
    }

    /// Platform radio this manager drives
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn ProximityTransport> {
        &self.transport
    }

    /// Take a discovery snapshot and make it the current directory.
    ///
    /// # Errors
    ///
    /// Returns `NoDevicesFound` for an empty snapshot and `DiscoveryFailed`
    /// for any radio fault. On error the previous directory is kept.
    pub async fn discover(&self) -> Result<Vec<PeerRecord>, DiscoveryError> {
        self.discovering.store(true, Ordering::SeqCst);
        let _guard = DiscoveringGuard(&self.discovering);

        let peers = self
            .transport
            .find_all_peers()
            .await
            .map_err(DiscoveryError::DiscoveryFailed)?;

        if peers.is_empty() {
            tracing::debug!("Discovery finished with no peers");
            return Err(DiscoveryError::NoDevicesFound);
        }

        let records: Vec<PeerRecord> = peers.into_iter().map(PeerRecord::from).collect();
        tracing::info!("Discovered {} peer(s)", records.len());

        let mut directory = self.directory.write().await;
        directory.replace(records);
        Ok(directory.snapshot())
    }

    /// Whether a discovery call is in flight
    #[must_use]
    pub fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    /// Resolve a peer by display name against the latest snapshot
    pub async fn lookup(&self, display_name: &str) -> Option<PeerRecord> {
        self.directory
            .read()
            .await
            .lookup_by_display_name(display_name)
            .cloned()
    }

    /// Copy of the latest snapshot
    pub async fn peers(&self) -> Vec<PeerRecord> {
        self.directory.read().await.snapshot()
    }

    /// Become discoverable and accept inbound connection requests.
    ///
    /// Every request is accepted on a background task; its outcome is sent to
    /// `sink` and never returned from this call. Calling this while already
    /// advertising does nothing.
    ///
    /// # Errors
    ///
    /// Returns `AdvertisingFailed` if the radio cannot start advertising
    pub async fn start_advertising(
        &self,
        sink: mpsc::Sender<InboundEvent>,
    ) -> Result<(), DiscoveryError> {
        let mut slot = self.advertising.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        // Register the handler first so no request raised by start() is lost
        let mut requests = self.transport.subscribe_requests();
        self.transport
            .start()
            .await
            .map_err(DiscoveryError::AdvertisingFailed)?;

        let transport = self.transport.clone();
        let accept_task = tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let peer = PeerRecord::from(request.peer.clone());
                let event = match transport.accept(request).await {
                    Ok(socket) => InboundEvent::Accepted { peer, socket },
                    Err(error) => {
                        tracing::warn!(
                            "Inbound request from {} failed: {}",
                            peer.display_name,
                            error
                        );
                        InboundEvent::Failed { peer, error }
                    }
                };

                if sink.send(event).await.is_err() {
                    tracing::debug!("Inbound sink closed, stopping accept task");
                    break;
                }
            }
        });

        *slot = Some(AdvertisingSubscription {
            accept_task,
            started_at: Instant::now(),
        });

        tracing::info!("Advertising as {}", self.transport.display_name());
        Ok(())
    }

    /// Stop advertising. Idempotent; radio faults are logged, not returned.
    pub async fn stop_advertising(&self) {
        let subscription = self.advertising.lock().await.take();

        if let Some(subscription) = subscription {
            tracing::info!(
                "Stopped advertising after {:?}",
                subscription.started_at.elapsed()
            );
        }

        if let Err(e) = self.transport.stop().await {
            tracing::warn!("Radio fault while stopping advertising: {}", e);
        }
    }

    /// Whether an advertising subscription is active
    pub async fn is_advertising(&self) -> bool {
        self.advertising.lock().await.is_some()
    }

    /// Probe the adapter power state.
    ///
    /// The probe performs a discovery call but leaves the directory untouched.
    pub async fn detect_adapter_state(&self) -> AdapterState {
        let probe = self.transport.find_all_peers().await;
        let state = AdapterState::from_probe(&probe);
        tracing::debug!("Adapter probe: {}", state);
        state
    }
}
