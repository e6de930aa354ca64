//! Session events, listen stream and link statistics

use super::error::LinkError;
use proxima_discovery::PeerRecord;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Notification not tied to a caller operation
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// An inbound request was accepted and is now the session's connection
    InboundConnected {
        /// Peer that connected
        peer: PeerRecord,
    },
    /// An inbound request could not be completed
    InboundFailed {
        /// Peer that asked to connect
        peer: PeerRecord,
        /// Why the request failed
        error: LinkError,
    },
}

/// One item produced by the listen loop
#[derive(Debug, Clone)]
pub enum ListenEvent {
    /// A decoded message
    Message(String),
    /// Reading failed; no further events follow
    Failed(LinkError),
}

/// Stream of messages from a running listen loop.
///
/// The stream ends when the loop stops: after `stop_listening`, after a
/// read failure, or once the connection is released.
#[derive(Debug)]
pub struct MessageStream {
    rx: mpsc::Receiver<ListenEvent>,
}

impl MessageStream {
    pub(crate) fn new(rx: mpsc::Receiver<ListenEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event; `None` once the loop has ended
    pub async fn recv(&mut self) -> Option<ListenEvent> {
        self.rx.recv().await
    }

    /// Wait for the next message, turning a failure into an error
    ///
    /// # Errors
    ///
    /// Returns the loop's `LinkError::Io` if reading failed
    pub async fn next_message(&mut self) -> Result<Option<String>, LinkError> {
        match self.rx.recv().await {
            Some(ListenEvent::Message(text)) => Ok(Some(text)),
            Some(ListenEvent::Failed(err)) => Err(err),
            None => Ok(None),
        }
    }

    /// Unwrap into the raw channel receiver
    #[must_use]
    pub fn into_inner(self) -> mpsc::Receiver<ListenEvent> {
        self.rx
    }
}

/// Snapshot of session traffic counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    /// Messages written
    pub messages_sent: u64,
    /// Messages delivered by the listen loop
    pub messages_received: u64,
    /// Frame bytes written, prefixes included
    pub bytes_sent: u64,
    /// Payload bytes delivered by the listen loop
    pub bytes_received: u64,
    /// Connections opened, in either direction
    pub connections_opened: u64,
    /// Inbound requests that failed
    pub inbound_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct LinkCounters {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    connections_opened: AtomicU64,
    inbound_failures: AtomicU64,
}

impl LinkCounters {
    pub(crate) fn sent(&self, frame_len: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(frame_len as u64, Ordering::Relaxed);
    }

    pub(crate) fn received(&self, payload_len: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub(crate) fn opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inbound_failed(&self) {
        self.inbound_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LinkStats {
        LinkStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            inbound_failures: self.inbound_failures.load(Ordering::Relaxed),
        }
    }
}
