//! Interactive chat over the open connection

use console::style;
use proxima_core::{ListenEvent, Session};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Typed line that ends the chat
pub const QUIT_COMMAND: &str = "/quit";

/// Why a chat ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatEnd {
    /// User typed `/quit` or closed the input
    Local,
    /// Connection dropped or was released
    Remote,
    /// Ctrl+C
    Interrupted,
}

/// Relay lines from `input` to the peer and print incoming messages until
/// one side ends the chat. The connection is left open for the caller.
///
/// # Errors
///
/// Returns an error if listening cannot start or the input fails.
pub async fn run<R>(session: &Session, input: R) -> anyhow::Result<ChatEnd>
where
    R: AsyncBufRead + Unpin,
{
    let peer = session
        .connected_peer()
        .await
        .map_or_else(|| "peer".to_string(), |p| p.display_name);
    let mut stream = session.start_listening().await?;
    let mut lines = input.lines();

    println!(
        "{} {} (type {} to leave)",
        style("Connected to").green(),
        style(&peer).bold(),
        QUIT_COMMAND
    );

    loop {
        tokio::select! {
            event = stream.recv() => match event {
                Some(ListenEvent::Message(text)) => {
                    println!("{} {}", style(format!("{peer}>")).cyan().bold(), text);
                }
                Some(ListenEvent::Failed(err)) => {
                    println!("{} {}", style("Connection lost:").red(), err);
                    return Ok(ChatEnd::Remote);
                }
                None => return Ok(ChatEnd::Remote),
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(ChatEnd::Local);
                };
                let line = line.trim_end();
                if line == QUIT_COMMAND {
                    return Ok(ChatEnd::Local);
                }
                if line.is_empty() {
                    continue;
                }
                if let Err(e) = session.send(line).await {
                    eprintln!("{} {}", style("Send failed:").red(), e);
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(ChatEnd::Interrupted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxima_core::ConnectionRequest;
    use proxima_core::frame::MessageReader;
    use proxima_transport::{MemoryRadio, PeerSocket, ProximityTransport};
    use std::sync::Arc;
    use tokio::io::BufReader;

    async fn connected(radio: &MemoryRadio) -> (Session, PeerSocket) {
        let remote = radio.endpoint("Alice");
        let mut requests = remote.subscribe_requests();
        remote.start().await.unwrap();
        let acceptor = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            remote.accept(request).await.unwrap()
        });

        let session = Session::new(Arc::new(radio.endpoint("desk"))).unwrap();
        session.discover().await.unwrap();
        session.connect(ConnectionRequest::new("Alice")).await.unwrap();
        (session, acceptor.await.unwrap())
    }

    #[tokio::test]
    async fn test_lines_are_sent_until_quit() {
        let radio = MemoryRadio::new();
        let (session, remote) = connected(&radio).await;

        let input = BufReader::new(&b"hello\n\nsecond line\n/quit\nignored\n"[..]);
        assert_eq!(run(&session, input).await.unwrap(), ChatEnd::Local);

        let mut reader = MessageReader::new(remote);
        assert_eq!(reader.read_message().await.unwrap(), "hello");
        assert_eq!(reader.read_message().await.unwrap(), "second line");
        assert_eq!(session.stats().messages_sent, 2);
    }

    #[tokio::test]
    async fn test_remote_hangup_ends_chat() {
        let radio = MemoryRadio::new();
        let (session, remote) = connected(&radio).await;
        drop(remote);

        // Input that never yields a line
        let (_keep_open, pipe) = tokio::io::duplex(16);
        let input = BufReader::new(pipe);
        assert_eq!(run(&session, input).await.unwrap(), ChatEnd::Remote);
    }
}
