//! LAN proximity radio over TCP.
//!
//! `TcpRadio` stands in for a short-range adapter on ordinary networks.
//! Advertising binds a listener; discovery probes a configured peer table and
//! reports the peers that answer. Each connection opens with a small radio
//! handshake before the stream is handed to the session:
//!
//! ```text
//! hello  := kind:u8 name_len:u8 name[name_len]     kind 0 = probe, 1 = connect
//! probe reply := name_len:u8 name[name_len]        then the listener closes
//! connect ack := 0x01                              written once the request is accepted
//! ```
//!
//! A declined request is closed without an ack.

use crate::transport::{
    InboundRequest, PeerInformation, PeerSocket, ProximityTransport, StatsCounters,
    TransportError, TransportResult, TransportStats,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Default advertising port
pub const DEFAULT_PORT: u16 = 47800;

const HELLO_PROBE: u8 = 0;
const HELLO_CONNECT: u8 = 1;
const CONNECT_ACK: u8 = 0x01;
const MAX_NAME_LEN: usize = u8::MAX as usize;
const REQUEST_QUEUE_DEPTH: usize = 8;

/// Peer known to the LAN radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpPeer {
    /// Name the peer is expected to advertise
    pub name: String,
    /// Address the peer advertises on
    pub addr: SocketAddr,
}

/// LAN radio configuration
#[derive(Debug, Clone)]
pub struct TcpRadioConfig {
    /// Name this endpoint advertises
    pub display_name: String,
    /// Address bound while advertising
    pub listen_addr: SocketAddr,
    /// Peers probed during discovery
    pub peers: Vec<TcpPeer>,
    /// Time allowed for one probe or handshake
    pub handshake_timeout: Duration,
}

impl TcpRadioConfig {
    /// Create a configuration advertising on all interfaces at [`DEFAULT_PORT`]
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            peers: Vec::new(),
            handshake_timeout: Duration::from_secs(3),
        }
    }

    /// Set the advertising address
    #[must_use]
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Add a peer to the discovery table
    #[must_use]
    pub fn with_peer(mut self, name: impl Into<String>, addr: SocketAddr) -> Self {
        self.peers.push(TcpPeer {
            name: name.into(),
            addr,
        });
        self
    }

    /// Set the probe and handshake timeout
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `TransportError::InvalidConfig` for an empty or oversized name
    pub fn validate(&self) -> TransportResult<()> {
        if self.display_name.is_empty() {
            return Err(TransportError::InvalidConfig(
                "display name must not be empty".to_string(),
            ));
        }
        if self.display_name.len() > MAX_NAME_LEN {
            return Err(TransportError::InvalidConfig(format!(
                "display name exceeds {MAX_NAME_LEN} bytes"
            )));
        }
        if self.handshake_timeout.is_zero() {
            return Err(TransportError::InvalidConfig(
                "handshake timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// TCP-backed proximity radio.
///
/// # Examples
///
/// ```no_run
/// use proxima_transport::{ProximityTransport, TcpRadio, TcpRadioConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TcpRadioConfig::new("kitchen")
///     .with_listen_addr("0.0.0.0:47800".parse()?)
///     .with_peer("garage", "192.168.1.20:47800".parse()?);
/// let radio = TcpRadio::new(config)?;
///
/// radio.start().await?;
/// for peer in radio.find_all_peers().await? {
///     println!("found {peer}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct TcpRadio {
    config: TcpRadioConfig,
    inner: Arc<TcpInner>,
}

struct TcpInner {
    display_name: String,
    handshake_timeout: Duration,
    advertising: AtomicBool,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    requests: Mutex<Option<mpsc::Sender<InboundRequest>>>,
    pending: DashMap<u64, TcpStream>,
    next_ticket: AtomicU64,
    counters: StatsCounters,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn hello(kind: u8, name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + name.len());
    buf.push(kind);
    buf.push(name.len() as u8);
    buf.extend_from_slice(name.as_bytes());
    buf
}

async fn read_name<S: AsyncRead + Unpin>(stream: &mut S) -> io::Result<String> {
    let len = stream.read_u8().await? as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn bind_listener(addr: SocketAddr) -> TransportResult<TcpListener> {
    let domain = if addr.is_ipv4() {
        socket2::Domain::IPV4
    } else {
        socket2::Domain::IPV6
    };

    let socket = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))
        .map_err(|e| TransportError::BindFailed(e.to_string()))?;

    // Re-advertising right after a disconnect must not trip over TIME_WAIT
    socket
        .set_reuse_address(true)
        .map_err(|e| TransportError::BindFailed(e.to_string()))?;
    socket
        .bind(&addr.into())
        .map_err(|e| TransportError::BindFailed(e.to_string()))?;
    socket
        .listen(128)
        .map_err(|e| TransportError::BindFailed(e.to_string()))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| TransportError::BindFailed(e.to_string()))?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).map_err(|e| TransportError::BindFailed(e.to_string()))
}

impl TcpRadio {
    /// Create a radio from a validated configuration
    ///
    /// # Errors
    /// Returns `TransportError::InvalidConfig` if the configuration is invalid
    pub fn new(config: TcpRadioConfig) -> TransportResult<Self> {
        config.validate()?;

        let inner = Arc::new(TcpInner {
            display_name: config.display_name.clone(),
            handshake_timeout: config.handshake_timeout,
            advertising: AtomicBool::new(false),
            listener_task: Mutex::new(None),
            local_addr: Mutex::new(None),
            requests: Mutex::new(None),
            pending: DashMap::new(),
            next_ticket: AtomicU64::new(0),
            counters: StatsCounters::default(),
        });

        Ok(Self { config, inner })
    }

    /// Address the listener is bound to while advertising
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.inner.local_addr)
    }

    /// Configured discovery table
    #[must_use]
    pub fn peers(&self) -> &[TcpPeer] {
        &self.config.peers
    }

    /// Number of inbound requests waiting for `accept`
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    async fn connect_addr(&self, addr: SocketAddr) -> TransportResult<PeerSocket> {
        let result = tokio::time::timeout(self.inner.handshake_timeout, async {
            let mut stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            stream
                .write_all(&hello(HELLO_CONNECT, &self.inner.display_name))
                .await?;

            // The acceptor writes its ack only once the session takes the request
            let mut ack = [0u8; 1];
            let n = stream.read(&mut ack).await?;
            Ok::<_, io::Error>((stream, n == 1 && ack[0] == CONNECT_ACK))
        });

        match result.await {
            Ok(Ok((stream, true))) => {
                self.inner.counters.open();
                tracing::debug!("Connected to {}", addr);
                Ok(Box::new(stream))
            }
            Ok(Ok((_, false))) => {
                self.inner.counters.failure();
                Err(TransportError::ConnectionFailed(format!(
                    "{addr} declined the connection"
                )))
            }
            Ok(Err(e)) => {
                self.inner.counters.failure();
                Err(TransportError::ConnectionFailed(format!("{addr}: {e}")))
            }
            Err(_) => {
                self.inner.counters.failure();
                Err(TransportError::Unreachable(format!(
                    "{addr} did not answer in time"
                )))
            }
        }
    }
}

impl TcpInner {
    async fn handle_incoming(self: Arc<Self>, mut stream: TcpStream, remote: SocketAddr) {
        let hello = tokio::time::timeout(self.handshake_timeout, async {
            let kind = stream.read_u8().await?;
            let name = read_name(&mut stream).await?;
            Ok::<_, io::Error>((kind, name))
        })
        .await;

        let (kind, name) = match hello {
            Ok(Ok(hello)) => hello,
            Ok(Err(e)) => {
                tracing::debug!("Malformed hello from {}: {}", remote, e);
                return;
            }
            Err(_) => {
                tracing::debug!("Hello from {} timed out", remote);
                return;
            }
        };

        match kind {
            HELLO_PROBE => {
                let mut reply = Vec::with_capacity(1 + self.display_name.len());
                reply.push(self.display_name.len() as u8);
                reply.extend_from_slice(self.display_name.as_bytes());
                if let Err(e) = stream.write_all(&reply).await {
                    tracing::debug!("Probe reply to {} failed: {}", remote, e);
                }
            }
            HELLO_CONNECT => {
                let Some(sender) = lock(&self.requests).clone() else {
                    tracing::debug!("Dropping request from {}: no handler", name);
                    return;
                };

                let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                self.pending.insert(ticket, stream);

                let peer = PeerInformation::new(name).with_host(remote.to_string());
                tracing::debug!("Connection request from {}", peer);
                if sender.send(InboundRequest::new(peer, ticket)).await.is_err() {
                    self.pending.remove(&ticket);
                }
            }
            other => {
                tracing::debug!("Unknown hello kind {} from {}", other, remote);
            }
        }
    }

    async fn probe(self: Arc<Self>, peer: TcpPeer) -> Option<PeerInformation> {
        let attempt = tokio::time::timeout(self.handshake_timeout, async {
            let mut stream = TcpStream::connect(peer.addr).await?;
            stream
                .write_all(&hello(HELLO_PROBE, &self.display_name))
                .await?;
            read_name(&mut stream).await
        })
        .await;

        match attempt {
            Ok(Ok(name)) => Some(PeerInformation::new(name).with_host(peer.addr.to_string())),
            Ok(Err(e)) => {
                tracing::trace!("Probe of {} failed: {}", peer.addr, e);
                None
            }
            Err(_) => {
                tracing::trace!("Probe of {} timed out", peer.addr);
                None
            }
        }
    }
}

#[async_trait]
impl ProximityTransport for TcpRadio {
    fn display_name(&self) -> &str {
        &self.config.display_name
    }

    async fn start(&self) -> TransportResult<()> {
        if self
            .inner
            .advertising
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let listener = match bind_listener(self.config.listen_addr) {
            Ok(listener) => listener,
            Err(e) => {
                self.inner.advertising.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;
        *lock(&self.inner.local_addr) = Some(local_addr);

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!("set_nodelay failed for {}: {}", remote, e);
                        }
                        tokio::spawn(inner.clone().handle_incoming(stream, remote));
                    }
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                    }
                }
            }
        });
        *lock(&self.inner.listener_task) = Some(task);

        tracing::info!(
            "Advertising as {} on {}",
            self.config.display_name,
            local_addr
        );
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.inner.advertising.store(false, Ordering::SeqCst);
        if let Some(task) = lock(&self.inner.listener_task).take() {
            task.abort();
            tracing::debug!("Stopped advertising as {}", self.config.display_name);
        }
        *lock(&self.inner.local_addr) = None;
        // Dropping the streams declines requests still waiting for accept
        self.inner.pending.clear();
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        self.inner.advertising.load(Ordering::SeqCst)
    }

    async fn find_all_peers(&self) -> TransportResult<Vec<PeerInformation>> {
        self.inner.counters.scan();

        let mut probes = JoinSet::new();
        for (index, peer) in self.config.peers.iter().cloned().enumerate() {
            let inner = self.inner.clone();
            probes.spawn(async move { (index, inner.probe(peer).await) });
        }

        let mut found = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((index, Some(peer))) => found.push((index, peer)),
                Ok((_, None)) => {}
                Err(e) => tracing::warn!("Probe task failed: {}", e),
            }
        }
        found.sort_by_key(|(index, _)| *index);

        Ok(found.into_iter().map(|(_, peer)| peer).collect())
    }

    async fn connect_peer(&self, peer: &PeerInformation) -> TransportResult<PeerSocket> {
        let addr = match peer.host_name.as_deref().map(str::parse::<SocketAddr>) {
            Some(Ok(addr)) => addr,
            _ => self
                .config
                .peers
                .iter()
                .rev()
                .find(|p| p.name == peer.display_name)
                .map(|p| p.addr)
                .ok_or_else(|| TransportError::Unreachable(peer.display_name.clone()))?,
        };
        self.connect_addr(addr).await
    }

    async fn connect_host(
        &self,
        host: &str,
        _service: Option<&str>,
    ) -> TransportResult<PeerSocket> {
        let addr = tokio::net::lookup_host(host)
            .await
            .map_err(|e| TransportError::Unreachable(format!("{host}: {e}")))?
            .next()
            .ok_or_else(|| TransportError::Unreachable(host.to_string()))?;
        self.connect_addr(addr).await
    }

    fn subscribe_requests(&self) -> mpsc::Receiver<InboundRequest> {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        *lock(&self.inner.requests) = Some(tx);
        rx
    }

    async fn accept(&self, request: InboundRequest) -> TransportResult<PeerSocket> {
        let (_, mut stream) = self
            .inner
            .pending
            .remove(&request.ticket())
            .ok_or(TransportError::UnknownRequest(request.ticket()))?;

        if let Err(e) = stream.write_all(&[CONNECT_ACK]).await {
            self.inner.counters.failure();
            return Err(TransportError::ConnectionFailed(format!(
                "{} went away before pairing completed: {e}",
                request.peer.display_name
            )));
        }

        self.inner.counters.accept();
        Ok(Box::new(stream))
    }

    async fn open_settings(&self) -> TransportResult<()> {
        Err(TransportError::SettingsUnavailable(
            "LAN radio has no adapter settings".to_string(),
        ))
    }

    fn stats(&self) -> TransportStats {
        self.inner.counters.snapshot()
    }
}

impl Drop for TcpRadio {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.inner.listener_task).take() {
            task.abort();
        }
    }
}
