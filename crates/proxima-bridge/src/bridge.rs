//! Command dispatcher

use crate::command::Command;
use crate::reply::{PeerInfo, Reply};
use proxima_core::{LinkError, ListenEvent, MessageStream, Session};
use serde_json::Value;

/// Result of dispatching one command
#[derive(Debug)]
pub enum Outcome {
    /// A single reply; the callback is done unless the reply keeps it
    Single(Reply),
    /// A stream of replies from the listen loop
    Channel(ReadChannel),
}

impl Outcome {
    /// The reply of a single-shot outcome
    #[must_use]
    pub fn into_reply(self) -> Option<Reply> {
        match self {
            Outcome::Single(reply) => Some(reply),
            Outcome::Channel(_) => None,
        }
    }

    /// The channel of a `read` outcome
    #[must_use]
    pub fn into_channel(self) -> Option<ReadChannel> {
        match self {
            Outcome::Single(_) => None,
            Outcome::Channel(channel) => Some(channel),
        }
    }
}

/// Replies produced by a running listen loop.
///
/// Yields an acknowledgement first, then one reply per message. A read
/// failure yields a final error reply.
#[derive(Debug)]
pub struct ReadChannel {
    ack: Option<Reply>,
    stream: MessageStream,
    finished: bool,
}

impl ReadChannel {
    fn new(stream: MessageStream) -> Self {
        Self {
            ack: Some(Reply::ok().keep()),
            stream,
            finished: false,
        }
    }

    /// Next reply; `None` once the loop has ended
    pub async fn next(&mut self) -> Option<Reply> {
        if let Some(ack) = self.ack.take() {
            return Some(ack);
        }
        if self.finished {
            return None;
        }

        match self.stream.recv().await {
            Some(ListenEvent::Message(text)) => Some(Reply::ok_with(text).keep()),
            Some(ListenEvent::Failed(err)) => {
                self.finished = true;
                Some(Reply::from(err))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

/// Routes bridge commands to a session
#[derive(Clone)]
pub struct Bridge {
    session: Session,
}

impl Bridge {
    /// Bridge over `session`
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// The session commands run against
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Parse and dispatch an action
    pub async fn handle(&self, action: &str, args_json: &str) -> Outcome {
        match Command::parse(action, args_json) {
            Ok(command) => self.dispatch(command).await,
            Err(e) if e.is_json() => {
                tracing::debug!("Rejected options for {}: {}", action, e);
                Outcome::Single(Reply::json_error(e.to_string()))
            }
            Err(e) => Outcome::Single(Reply::error(e.to_string())),
        }
    }

    /// Run one command
    pub async fn dispatch(&self, command: Command) -> Outcome {
        tracing::debug!("Dispatching {}", command.action());

        let result = match command {
            Command::IsEnabled => Ok(Reply::ok_with(self.session.is_enabled().await)),
            Command::Enable => self.session.enable().await.map(|()| Reply::ok()),
            Command::Disable => self.session.disable().await.map(|()| Reply::ok()),
            Command::DiscoverDevices => self.session.discover().await.map(|peers| {
                let peers: Vec<Value> = peers
                    .iter()
                    .map(PeerInfo::from)
                    .filter_map(|info| serde_json::to_value(info).ok())
                    .collect();
                Reply::ok_with(peers)
            }),
            Command::StartAdvertising => {
                self.session.start_advertising().await.map(|()| Reply::ok())
            }
            Command::Connect(request) => {
                self.session.connect(request).await.map(|()| Reply::ok())
            }
            Command::Disconnect(options) => {
                let keep = match options.continue_advertise {
                    Some(keep) => keep,
                    None => self
                        .session
                        .current_connection()
                        .await
                        .is_some_and(|conn| conn.keep_advertising_after_close()),
                };
                self.session.disconnect(keep).await.map(|()| Reply::ok())
            }
            Command::Send(options) => {
                self.session.send(&options.message).await.map(|()| Reply::ok())
            }
            Command::Read => {
                return match self.session.start_listening().await {
                    Ok(stream) => Outcome::Channel(ReadChannel::new(stream)),
                    // The running loop keeps serving the original callback
                    Err(LinkError::AlreadyListening) => Outcome::Single(Reply::ok().keep()),
                    Err(e) => Outcome::Single(e.into()),
                };
            }
        };

        Outcome::Single(result.unwrap_or_else(Reply::from))
    }
}
