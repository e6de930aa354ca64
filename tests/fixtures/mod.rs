//! Two-session test fixtures
//!
//! Provides a pair of sessions that can reach each other, either over the
//! in-memory radio or over TCP on loopback:
//! - Advertising and discovery
//! - Connection establishment from the initiator
//! - Teardown of both sides
//!
//! # Example
//!
//! ```no_run
//! use proxima_integration_tests::MemoryPair;
//!
//! #[tokio::test]
//! async fn test_exchange() {
//!     let pair = MemoryPair::new().unwrap();
//!     pair.connect().await.unwrap();
//!
//!     pair.initiator.send("hello").await.unwrap();
//!     // ... read on the responder ...
//!
//!     pair.cleanup().await.unwrap();
//! }
//! ```

use proxima_core::{ConnectionRequest, LinkError, Session, SessionEvent};
use proxima_discovery::PeerRecord;
use proxima_transport::{MemoryRadio, TcpRadio, TcpRadioConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Display name of the advertising side
pub const RESPONDER: &str = "Alice";

/// Display name of the connecting side
pub const INITIATOR: &str = "phone";

/// How long fixtures wait for the responder to see the connection
const INBOUND_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for the next `InboundConnected` event
///
/// # Errors
///
/// Returns `LinkError::ConnectFailed` if none arrives in time.
pub async fn wait_for_inbound(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> Result<PeerRecord, LinkError> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::InboundConnected { peer }) => return Ok(peer),
                Ok(SessionEvent::InboundFailed { error, .. }) => return Err(error),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(LinkError::connect_failed("session event channel closed"));
                }
            }
        }
    };

    tokio::time::timeout(INBOUND_TIMEOUT, wait)
        .await
        .map_err(|_| LinkError::connect_failed("no inbound connection"))?
}

/// Two sessions on one in-memory radio
pub struct MemoryPair {
    /// Radio both sessions share
    pub radio: MemoryRadio,
    /// Connecting side
    pub initiator: Session,
    /// Advertising side
    pub responder: Session,
}

impl MemoryPair {
    /// Create both sessions; nothing is advertising yet
    ///
    /// # Errors
    ///
    /// Returns `LinkError` if a session cannot be created.
    pub fn new() -> Result<Self, LinkError> {
        let radio = MemoryRadio::new();
        let initiator = Session::new(Arc::new(radio.endpoint(INITIATOR)))?;
        let responder = Session::new(Arc::new(radio.endpoint(RESPONDER)))?;

        Ok(Self {
            radio,
            initiator,
            responder,
        })
    }

    /// Advertise on the responder, then discover and connect from the
    /// initiator. Returns once both sides hold the connection.
    ///
    /// # Errors
    ///
    /// Returns the first `LinkError` from either side.
    pub async fn connect(&self) -> Result<(), LinkError> {
        connect_pair(&self.initiator, &self.responder).await
    }

    /// Close both sessions
    ///
    /// # Errors
    ///
    /// Returns `LinkError::DisconnectFailed` if a release fails.
    pub async fn cleanup(&self) -> Result<(), LinkError> {
        self.initiator.close().await?;
        self.responder.close().await
    }
}

/// Two sessions on TCP radios bound to loopback
pub struct TcpPair {
    /// Connecting side
    pub initiator: Session,
    /// Advertising side
    pub responder: Session,
    /// Address the responder listens on
    pub responder_addr: SocketAddr,
}

impl TcpPair {
    /// Start the responder advertising on an ephemeral loopback port and
    /// point the initiator's discovery table at it
    ///
    /// # Errors
    ///
    /// Returns `LinkError` if either radio or session cannot be set up.
    pub async fn new() -> Result<Self, LinkError> {
        let loopback = SocketAddr::from(([127, 0, 0, 1], 0));

        let responder_radio = Arc::new(
            TcpRadio::new(TcpRadioConfig::new(RESPONDER).with_listen_addr(loopback))
                .map_err(|e| LinkError::InvalidConfig(e.to_string().into()))?,
        );
        let responder = Session::new(responder_radio.clone())?;
        responder.start_advertising().await?;
        let responder_addr = responder_radio
            .local_addr()
            .ok_or_else(|| LinkError::invalid_config("responder is not listening"))?;

        let initiator_radio = TcpRadio::new(
            TcpRadioConfig::new(INITIATOR)
                .with_listen_addr(loopback)
                .with_peer(RESPONDER, responder_addr),
        )
        .map_err(|e| LinkError::InvalidConfig(e.to_string().into()))?;
        let initiator = Session::new(Arc::new(initiator_radio))?;

        Ok(Self {
            initiator,
            responder,
            responder_addr,
        })
    }

    /// Discover and connect from the initiator
    ///
    /// # Errors
    ///
    /// Returns the first `LinkError` from either side.
    pub async fn connect(&self) -> Result<(), LinkError> {
        connect_pair(&self.initiator, &self.responder).await
    }

    /// Close both sessions
    ///
    /// # Errors
    ///
    /// Returns `LinkError::DisconnectFailed` if a release fails.
    pub async fn cleanup(&self) -> Result<(), LinkError> {
        self.initiator.close().await?;
        self.responder.close().await
    }
}

async fn connect_pair(initiator: &Session, responder: &Session) -> Result<(), LinkError> {
    let mut events = responder.subscribe();
    responder.start_advertising().await?;

    initiator.discover().await?;
    initiator.connect(ConnectionRequest::new(RESPONDER)).await?;

    let peer = wait_for_inbound(&mut events).await?;
    tracing::debug!("{} accepted {}", RESPONDER, peer.display_name);
    Ok(())
}
