//! The single open connection of a session.
//!
//! A `Connection` owns the paired socket, split into read and write halves at
//! open. Framing cursors are created on first use and never outlive the
//! socket: `close` releases reader, writer and socket in that order and
//! collects faults instead of stopping at the first one.

use crate::error::FrameError;
use crate::frame::{MessageReader, MessageWriter};
use crate::session::ConnectionMode;
use proxima_discovery::PeerRecord;
use proxima_transport::PeerSocket;
use std::io;
use std::time::{Duration, Instant};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, watch};

/// How a connection came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOrigin {
    /// Opened by a local connect call
    Outbound(ConnectionMode),
    /// Accepted while advertising
    Inbound,
}

/// Stream half that turns into a framing cursor on first use
enum Slot<H, C> {
    Half(H),
    Cursor(C),
    Released,
}

impl<H, C> Slot<H, C> {
    fn cursor(&mut self, open: impl FnOnce(H) -> C) -> Option<&mut C> {
        if matches!(self, Slot::Half(_)) {
            if let Slot::Half(half) = std::mem::replace(self, Slot::Released) {
                *self = Slot::Cursor(open(half));
            }
        }
        match self {
            Slot::Cursor(cursor) => Some(cursor),
            _ => None,
        }
    }
}

type ReadSlot = Slot<ReadHalf<PeerSocket>, MessageReader<ReadHalf<PeerSocket>>>;
type WriteSlot = Slot<WriteHalf<PeerSocket>, MessageWriter<WriteHalf<PeerSocket>>>;

/// An open, framed connection to one peer
pub struct Connection {
    id: u64,
    peer: PeerRecord,
    origin: ConnectionOrigin,
    keep_advertising_after_close: bool,
    max_message_size: usize,
    opened_at: Instant,
    reader: Mutex<ReadSlot>,
    writer: Mutex<WriteSlot>,
    closed: watch::Sender<bool>,
}

impl Connection {
    /// Take ownership of a paired socket
    #[must_use]
    pub fn open(
        id: u64,
        peer: PeerRecord,
        origin: ConnectionOrigin,
        keep_advertising_after_close: bool,
        socket: PeerSocket,
        max_message_size: usize,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(socket);
        let (closed, _) = watch::channel(false);

        Self {
            id,
            peer,
            origin,
            keep_advertising_after_close,
            max_message_size,
            opened_at: Instant::now(),
            reader: Mutex::new(Slot::Half(read_half)),
            writer: Mutex::new(Slot::Half(write_half)),
            closed,
        }
    }

    /// Session-local connection identifier
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Peer at the other end
    #[must_use]
    pub fn peer(&self) -> &PeerRecord {
        &self.peer
    }

    /// How the connection was opened
    #[must_use]
    pub fn origin(&self) -> ConnectionOrigin {
        self.origin
    }

    /// Whether disconnect should re-enter advertising by default
    #[must_use]
    pub fn keep_advertising_after_close(&self) -> bool {
        self.keep_advertising_after_close
    }

    /// Time since the connection was opened
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Whether `close` has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Read the next message.
    ///
    /// Returns `Ok(None)` once the connection is closed, including when the
    /// close happens while this read is waiting.
    ///
    /// # Errors
    ///
    /// Returns `FrameError` if the stream fails or carries a malformed frame
    pub async fn read_message(&self) -> Result<Option<String>, FrameError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Ok(None);
        }

        let mut slot = self.reader.lock().await;
        let max = self.max_message_size;
        let Some(reader) = slot.cursor(|half| MessageReader::with_max_message_size(half, max))
        else {
            return Ok(None);
        };

        tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => Ok(None),
            result = reader.read_message() => result.map(Some),
        }
    }

    /// Write one message, returning the frame size.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::Closed` after `close`, otherwise any framing or
    /// stream fault.
    pub async fn write_message(&self, text: &str) -> Result<usize, FrameError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(FrameError::Closed);
        }

        let mut slot = self.writer.lock().await;
        let max = self.max_message_size;
        let Some(writer) = slot.cursor(|half| MessageWriter::with_max_message_size(half, max))
        else {
            return Err(FrameError::Closed);
        };

        tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => Err(FrameError::Closed),
            result = writer.write_message(text) => result,
        }
    }

    /// Release reader, writer and socket.
    ///
    /// Always runs to completion and returns every fault it met. Calling it
    /// again returns no faults and does nothing.
    pub async fn close(&self) -> Vec<FrameError> {
        if self.closed.send_replace(true) {
            return Vec::new();
        }

        let mut faults = Vec::new();

        let read_half = match std::mem::replace(&mut *self.reader.lock().await, Slot::Released) {
            Slot::Half(half) => Some(half),
            Slot::Cursor(reader) => Some(reader.into_inner()),
            Slot::Released => None,
        };

        let write_half = match std::mem::replace(&mut *self.writer.lock().await, Slot::Released) {
            Slot::Half(half) => Some(half),
            Slot::Cursor(mut writer) => {
                if let Err(e) = writer.flush().await {
                    faults.push(e);
                }
                Some(writer.into_inner())
            }
            Slot::Released => None,
        };

        // Socket last: rejoin the halves so the shutdown reaches the stream itself
        if let (Some(read_half), Some(write_half)) = (read_half, write_half) {
            let mut socket = read_half.unsplit(write_half);
            if let Err(e) = socket.shutdown().await {
                if !matches!(
                    e.kind(),
                    io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe
                ) {
                    faults.push(FrameError::Io(e));
                }
            }
        }

        tracing::debug!(
            "Connection {} to {} closed after {:?} ({} fault(s))",
            self.id,
            self.peer.display_name,
            self.uptime(),
            faults.len()
        );
        faults
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer.display_name)
            .field("origin", &self.origin)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
