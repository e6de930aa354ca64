//! Listen loop
//!
//! One spawned task per armed loop reads frames in sequence and forwards each
//! decoded message. The loop re-checks the armed flag and its generation
//! before every read, so stopping never interrupts a read that is already in
//! flight: that message is still delivered and then the stream ends.

use super::error::{LinkError, Result};
use super::events::{ListenEvent, MessageStream};
use super::session::{Session, SessionInner};
use crate::connection::Connection;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

impl Session {
    /// Start the listen loop on the open connection.
    ///
    /// # Errors
    ///
    /// - `NoConnection` if nothing is open
    /// - `AlreadyListening` if a loop is running; that loop keeps running and
    ///   no second loop starts
    pub async fn start_listening(&self) -> Result<MessageStream> {
        let conn = self
            .current_connection()
            .await
            .ok_or(LinkError::NoConnection)?;

        if self
            .inner
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(LinkError::AlreadyListening);
        }

        let generation = self.inner.listen_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::channel(self.inner.config.listen_channel_capacity);

        tracing::debug!(
            "Listening on connection {} (generation {})",
            conn.id(),
            generation
        );
        tokio::spawn(listen_loop(
            Arc::downgrade(&self.inner),
            conn,
            generation,
            tx,
        ));

        Ok(MessageStream::new(rx))
    }

    /// Disarm the listen loop.
    ///
    /// A read already in flight completes and its message is delivered;
    /// the loop then ends without reading again.
    pub fn stop_listening(&self) {
        if self.inner.listening.swap(false, Ordering::SeqCst) {
            tracing::debug!("Listening stopped");
        }
    }

    /// Whether a listen loop is armed
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.inner.listening.load(Ordering::SeqCst)
    }
}

impl SessionInner {
    fn is_armed(&self, generation: u64) -> bool {
        self.listening.load(Ordering::SeqCst)
            && self.listen_generation.load(Ordering::SeqCst) == generation
    }

    /// Clear the flag if it still belongs to `generation`
    fn disarm(&self, generation: u64) {
        if self.listen_generation.load(Ordering::SeqCst) == generation {
            self.listening.store(false, Ordering::SeqCst);
        }
    }
}

async fn listen_loop(
    inner: Weak<SessionInner>,
    conn: Arc<Connection>,
    generation: u64,
    tx: mpsc::Sender<ListenEvent>,
) {
    loop {
        match inner.upgrade() {
            Some(session) if session.is_armed(generation) => {}
            _ => break,
        }

        match conn.read_message().await {
            Ok(Some(text)) => {
                if let Some(session) = inner.upgrade() {
                    session.counters.received(text.len());
                }
                tracing::trace!("Received {} bytes on connection {}", text.len(), conn.id());

                if tx.send(ListenEvent::Message(text)).await.is_err() {
                    // Nobody is reading the stream any more
                    if let Some(session) = inner.upgrade() {
                        session.disarm(generation);
                    }
                    break;
                }
            }
            // Connection released
            Ok(None) => {
                if let Some(session) = inner.upgrade() {
                    session.disarm(generation);
                }
                break;
            }
            Err(e) => {
                let Some(session) = inner.upgrade() else {
                    break;
                };
                if session.is_armed(generation) {
                    session.disarm(generation);
                    tracing::warn!("Listen loop on connection {} failed: {}", conn.id(), e);
                    let _ = tx
                        .send(ListenEvent::Failed(LinkError::Io(e.to_string().into())))
                        .await;
                }
                break;
            }
        }
    }

    tracing::debug!(
        "Listen loop {} on connection {} ended",
        generation,
        conn.id()
    );
}
