//! In-process proximity radio.
//!
//! `MemoryRadio` models a shared radio medium inside one process. Every
//! endpoint created from the same radio can discover the others while they
//! advertise, and paired endpoints talk over `tokio::io::duplex` pipes. The
//! adapter power state and the outcome of the settings screen are scriptable,
//! which makes the radio suitable for exercising every session path in tests.

use crate::transport::{
    InboundRequest, PeerInformation, PeerSocket, ProximityTransport, StatsCounters,
    TransportError, TransportResult, TransportStats,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};

/// Buffer size of each in-memory pipe
const PIPE_CAPACITY: usize = 64 * 1024;

/// Depth of the inbound request queue per endpoint
const REQUEST_QUEUE_DEPTH: usize = 8;

/// Shared in-process radio medium.
///
/// # Examples
///
/// ```no_run
/// use proxima_transport::{MemoryRadio, ProximityTransport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let radio = MemoryRadio::new();
/// let phone = radio.endpoint("phone");
/// let sensor = radio.endpoint_with_host("sensor", "00:11:22:33:44:55");
///
/// sensor.start().await?;
/// let peers = phone.find_all_peers().await?;
/// assert_eq!(peers.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MemoryRadio {
    inner: Arc<RadioInner>,
}

#[derive(Default)]
struct RadioInner {
    endpoints: DashMap<String, Arc<EndpointState>>,
    next_ticket: AtomicU64,
}

struct EndpointState {
    name: String,
    host: Option<String>,
    enabled: AtomicBool,
    advertising: AtomicBool,
    /// Adapter state applied when the user leaves the settings screen
    settings_outcome: Mutex<Option<bool>>,
    requests: Mutex<Option<mpsc::Sender<InboundRequest>>>,
    pending: DashMap<u64, oneshot::Sender<PeerSocket>>,
    counters: StatsCounters,
}

impl EndpointState {
    fn new(name: &str, host: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            host,
            enabled: AtomicBool::new(true),
            advertising: AtomicBool::new(false),
            settings_outcome: Mutex::new(None),
            requests: Mutex::new(None),
            pending: DashMap::new(),
            counters: StatsCounters::default(),
        }
    }

    fn info(&self) -> PeerInformation {
        PeerInformation {
            display_name: self.name.clone(),
            host_name: self.host.clone(),
            service_name: None,
        }
    }

    fn ensure_enabled(&self) -> TransportResult<()> {
        if self.enabled.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::adapter_off())
        }
    }
}

/// Withdraws a pairing request when the requester stops waiting for it
struct PendingTicket {
    target: Arc<EndpointState>,
    ticket: u64,
}

impl Drop for PendingTicket {
    fn drop(&mut self) {
        self.target.pending.remove(&self.ticket);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryRadio {
    /// Create an empty radio medium
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create an endpoint without a resolvable host address
    #[must_use]
    pub fn endpoint(&self, name: &str) -> MemoryTransport {
        self.attach(name, None)
    }

    /// Get or create an endpoint that reports `host` as its address
    #[must_use]
    pub fn endpoint_with_host(&self, name: &str, host: &str) -> MemoryTransport {
        self.attach(name, Some(host.to_string()))
    }

    fn attach(&self, name: &str, host: Option<String>) -> MemoryTransport {
        let state = self
            .inner
            .endpoints
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(EndpointState::new(name, host)))
            .clone();

        MemoryTransport {
            radio: self.inner.clone(),
            state,
        }
    }

    /// Number of endpoints attached to the medium
    #[must_use]
    pub fn endpoint_count(&self) -> usize {
        self.inner.endpoints.len()
    }
}

/// One endpoint on a [`MemoryRadio`]
#[derive(Clone)]
pub struct MemoryTransport {
    radio: Arc<RadioInner>,
    state: Arc<EndpointState>,
}

impl MemoryTransport {
    /// Power the adapter on or off. Powering off stops advertising.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::Release);
        if !enabled {
            self.state.advertising.store(false, Ordering::Release);
        }
    }

    /// Whether the adapter is powered on
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Acquire)
    }

    /// Script what the user does on the settings screen.
    ///
    /// `Some(on)` leaves the adapter powered `on`; `None` leaves it untouched.
    pub fn set_settings_outcome(&self, outcome: Option<bool>) {
        *lock(&self.state.settings_outcome) = outcome;
    }

    /// Number of inbound requests waiting for `accept`
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.state.pending.len()
    }

    fn find_by_name(&self, name: &str) -> Option<Arc<EndpointState>> {
        self.radio.endpoints.get(name).map(|e| e.value().clone())
    }

    fn find_by_host(&self, host: &str) -> Option<Arc<EndpointState>> {
        self.radio
            .endpoints
            .iter()
            .find(|e| e.value().host.as_deref() == Some(host))
            .map(|e| e.value().clone())
    }

    async fn request_pairing(&self, target: Arc<EndpointState>) -> TransportResult<PeerSocket> {
        self.state.ensure_enabled()?;

        if !target.enabled.load(Ordering::Acquire) || !target.advertising.load(Ordering::Acquire)
        {
            self.state.counters.failure();
            return Err(TransportError::ConnectionFailed(format!(
                "{} is not accepting connections",
                target.name
            )));
        }

        let sender = lock(&target.requests).clone().ok_or_else(|| {
            TransportError::ConnectionFailed(format!("{} has no request handler", target.name))
        })?;

        let ticket = self.radio.next_ticket.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        target.pending.insert(ticket, reply_tx);
        let _ticket = PendingTicket {
            target: target.clone(),
            ticket,
        };

        let request = InboundRequest::new(self.state.info(), ticket);
        if sender.send(request).await.is_err() {
            self.state.counters.failure();
            return Err(TransportError::ConnectionFailed(format!(
                "{} stopped listening for requests",
                target.name
            )));
        }

        match reply_rx.await {
            Ok(socket) => {
                self.state.counters.open();
                tracing::debug!("{} paired with {}", self.state.name, target.name);
                Ok(socket)
            }
            Err(_) => {
                self.state.counters.failure();
                Err(TransportError::ConnectionFailed(format!(
                    "{} declined the connection",
                    target.name
                )))
            }
        }
    }
}

#[async_trait]
impl ProximityTransport for MemoryTransport {
    fn display_name(&self) -> &str {
        &self.state.name
    }

    async fn start(&self) -> TransportResult<()> {
        self.state.ensure_enabled()?;
        self.state.advertising.store(true, Ordering::Release);
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.state.advertising.store(false, Ordering::Release);
        // Requests still waiting for accept are declined
        self.state.pending.clear();
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        self.state.advertising.load(Ordering::Acquire)
    }

    async fn find_all_peers(&self) -> TransportResult<Vec<PeerInformation>> {
        self.state.ensure_enabled()?;
        self.state.counters.scan();

        let mut peers: Vec<PeerInformation> = self
            .radio
            .endpoints
            .iter()
            .filter(|e| e.key() != &self.state.name)
            .filter(|e| {
                e.value().enabled.load(Ordering::Acquire)
                    && e.value().advertising.load(Ordering::Acquire)
            })
            .map(|e| e.value().info())
            .collect();
        peers.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        Ok(peers)
    }

    async fn connect_peer(&self, peer: &PeerInformation) -> TransportResult<PeerSocket> {
        self.state.ensure_enabled()?;
        let target = self
            .find_by_name(&peer.display_name)
            .ok_or_else(|| TransportError::Unreachable(peer.display_name.clone()))?;
        self.request_pairing(target).await
    }

    async fn connect_host(
        &self,
        host: &str,
        _service: Option<&str>,
    ) -> TransportResult<PeerSocket> {
        self.state.ensure_enabled()?;
        let target = self
            .find_by_host(host)
            .ok_or_else(|| TransportError::Unreachable(host.to_string()))?;
        self.request_pairing(target).await
    }

    fn subscribe_requests(&self) -> mpsc::Receiver<InboundRequest> {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        *lock(&self.state.requests) = Some(tx);
        rx
    }

    async fn accept(&self, request: InboundRequest) -> TransportResult<PeerSocket> {
        self.state.ensure_enabled()?;

        let (_, reply) = self
            .state
            .pending
            .remove(&request.ticket())
            .ok_or(TransportError::UnknownRequest(request.ticket()))?;

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        if reply.send(Box::new(remote)).is_err() {
            self.state.counters.failure();
            return Err(TransportError::ConnectionFailed(format!(
                "{} went away before pairing completed",
                request.peer.display_name
            )));
        }

        self.state.counters.accept();
        Ok(Box::new(local))
    }

    async fn open_settings(&self) -> TransportResult<()> {
        let outcome = *lock(&self.state.settings_outcome);
        if let Some(enabled) = outcome {
            self.set_enabled(enabled);
        }
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.state.counters.snapshot()
    }
}
