//! Integration tests for Proxima
//!
//! Full session flows across crates: discovery, pairing, framing on the
//! wire, the listen loop and teardown, over both radios.

use proxima_bridge::{Bridge, Reply, ReplyStatus};
use proxima_core::frame::MessageReader;
use proxima_core::{
    AdapterState, ConnectionMode, ConnectionRequest, LinkError, LinkState, ListenEvent, Session,
    SessionConfig,
};
use proxima_integration_tests::fixtures::{INITIATOR, RESPONDER, wait_for_inbound};
use proxima_integration_tests::{MemoryPair, TcpPair};
use proxima_transport::{MemoryRadio, PeerSocket, ProximityTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

/// Raw advertising endpoint that hands accepted sockets to the test
async fn raw_peer(radio: &MemoryRadio, name: &str) -> mpsc::Receiver<PeerSocket> {
    let endpoint = radio.endpoint(name);
    let mut requests = endpoint.subscribe_requests();
    endpoint.start().await.unwrap();

    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            if let Ok(socket) = endpoint.accept(request).await {
                let _ = tx.send(socket).await;
            }
        }
    });
    rx
}

// ============================================================================
// Session scenario over the memory radio
// ============================================================================

#[tokio::test]
async fn test_discover_connect_send_disconnect_scenario() {
    let radio = MemoryRadio::new();
    let mut sockets = raw_peer(&radio, "Alice").await;
    let session = Session::new(Arc::new(radio.endpoint("phone"))).unwrap();

    let peers = session.discover().await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].display_name, "Alice");
    assert_eq!(peers[0].host_address, "unknown");

    session.connect(ConnectionRequest::new("Alice")).await.unwrap();
    assert_eq!(session.state().await, LinkState::Connected);
    let mut remote = sockets.recv().await.unwrap();

    session.send("hi").await.unwrap();
    let mut wire = [0u8; 6];
    remote.read_exact(&mut wire).await.unwrap();
    assert_eq!(hex::encode(wire), "020000006869");

    session.disconnect(false).await.unwrap();
    assert_eq!(session.state().await, LinkState::Idle);
    assert!(matches!(
        session.send("hi").await,
        Err(LinkError::NoConnection)
    ));

    // Remote sees the socket go away
    let mut rest = Vec::new();
    assert_eq!(remote.read_to_end(&mut rest).await.unwrap(), 0);
}

#[tokio::test]
async fn test_discover_with_no_peers() {
    let radio = MemoryRadio::new();
    let session = Session::new(Arc::new(radio.endpoint("phone"))).unwrap();

    assert!(matches!(
        session.discover().await,
        Err(LinkError::NoDevicesFound)
    ));
}

#[tokio::test]
async fn test_stale_snapshot_is_not_consulted() {
    let radio = MemoryRadio::new();
    let _alice = raw_peer(&radio, "Alice").await;
    let _bob = raw_peer(&radio, "Bob").await;
    let session = Session::new(Arc::new(radio.endpoint("phone"))).unwrap();

    session.discover().await.unwrap();
    radio.endpoint("Alice").stop().await.unwrap();
    let peers = session.discover().await.unwrap();
    assert_eq!(peers.len(), 1);

    let err = session
        .connect(ConnectionRequest::new("Alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::PeerNotFound(ref name) if name == "Alice"));
}

#[tokio::test]
async fn test_second_connect_releases_first() {
    let radio = MemoryRadio::new();
    let mut alice = raw_peer(&radio, "Alice").await;
    let mut bob = raw_peer(&radio, "Bob").await;
    let session = Session::new(Arc::new(radio.endpoint("phone"))).unwrap();
    session.discover().await.unwrap();

    session.connect(ConnectionRequest::new("Alice")).await.unwrap();
    let mut first = alice.recv().await.unwrap();

    session.connect(ConnectionRequest::new("Bob")).await.unwrap();
    let mut second = bob.recv().await.unwrap();

    let mut buf = Vec::new();
    assert_eq!(first.read_to_end(&mut buf).await.unwrap(), 0);

    assert_eq!(session.connected_peer().await.unwrap().display_name, "Bob");
    session.send("only bob").await.unwrap();
    let mut reader = MessageReader::new(&mut second);
    assert_eq!(reader.read_message().await.unwrap(), "only bob");
}

#[tokio::test]
async fn test_device_mode_connects_by_host() {
    let radio = MemoryRadio::new();
    let device = radio.endpoint_with_host("Sensor", "sensor.local");
    let mut requests = device.subscribe_requests();
    device.start().await.unwrap();
    let acceptor = tokio::spawn(async move {
        let request = requests.recv().await.unwrap();
        device.accept(request).await.unwrap()
    });

    let session = Session::new(Arc::new(radio.endpoint("phone"))).unwrap();
    let peers = session.discover().await.unwrap();
    assert_eq!(peers[0].host_address, "sensor.local");

    let request = ConnectionRequest::new("Sensor")
        .with_mode(ConnectionMode::PhoneToDevice)
        .with_payload("ping");
    session.connect(request).await.unwrap();

    let mut reader = MessageReader::new(acceptor.await.unwrap());
    assert_eq!(reader.read_message().await.unwrap(), "ping");
}

// ============================================================================
// Two sessions talking to each other
// ============================================================================

#[tokio::test]
async fn test_two_sessions_exchange_messages() {
    let pair = MemoryPair::new().unwrap();
    pair.connect().await.unwrap();

    assert_eq!(pair.responder.state().await, LinkState::Connected);
    assert_eq!(
        pair.responder.connected_peer().await.unwrap().display_name,
        INITIATOR
    );

    let mut at_responder = pair.responder.start_listening().await.unwrap();
    let mut at_initiator = pair.initiator.start_listening().await.unwrap();

    pair.initiator.send("hello Alice").await.unwrap();
    pair.initiator.send("second").await.unwrap();
    pair.responder.send("héllo phone").await.unwrap();

    assert_eq!(
        at_responder.next_message().await.unwrap().as_deref(),
        Some("hello Alice")
    );
    assert_eq!(
        at_responder.next_message().await.unwrap().as_deref(),
        Some("second")
    );
    assert_eq!(
        at_initiator.next_message().await.unwrap().as_deref(),
        Some("héllo phone")
    );

    assert_eq!(pair.initiator.stats().messages_sent, 2);
    assert_eq!(pair.responder.stats().messages_received, 2);

    pair.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_is_seen_by_listening_peer() {
    let pair = MemoryPair::new().unwrap();
    pair.connect().await.unwrap();
    let mut at_responder = pair.responder.start_listening().await.unwrap();

    pair.initiator.disconnect(false).await.unwrap();

    match at_responder.recv().await {
        Some(ListenEvent::Failed(err)) => assert!(matches!(err, LinkError::Io(_))),
        other => panic!("expected read failure, got {other:?}"),
    }
    assert!(!pair.responder.is_listening());
}

#[tokio::test]
async fn test_responder_keeps_advertising_after_inbound_close() {
    let pair = MemoryPair::new().unwrap();
    pair.connect().await.unwrap();

    let conn = pair.responder.current_connection().await.unwrap();
    assert!(conn.keep_advertising_after_close());

    let mut events = pair.responder.subscribe();
    pair.responder
        .disconnect(conn.keep_advertising_after_close())
        .await
        .unwrap();
    assert_eq!(pair.responder.state().await, LinkState::Advertising);

    // A second round works against the re-armed advertiser
    pair.initiator
        .connect(ConnectionRequest::new(RESPONDER))
        .await
        .unwrap();
    wait_for_inbound(&mut events).await.unwrap();
    assert_eq!(pair.responder.stats().connections_opened, 2);
}

#[tokio::test]
async fn test_unaccepted_connect_times_out() {
    let radio = MemoryRadio::new();
    let silent = radio.endpoint("Silent");
    let _requests = silent.subscribe_requests();
    silent.start().await.unwrap();

    let config = SessionConfig::new().with_connect_timeout(Duration::from_millis(200));
    let session = Session::with_config(Arc::new(radio.endpoint("phone")), config).unwrap();
    session.discover().await.unwrap();

    let err = session
        .connect(ConnectionRequest::new("Silent"))
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::ConnectFailed(_)));
    assert_eq!(session.state().await, LinkState::Idle);
}

// ============================================================================
// Adapter and bridge
// ============================================================================

#[tokio::test]
async fn test_adapter_off_blocks_discovery() {
    let radio = MemoryRadio::new();
    let endpoint = radio.endpoint("phone");
    endpoint.set_enabled(false);
    let session = Session::new(Arc::new(endpoint.clone())).unwrap();

    assert_eq!(session.adapter_state().await, AdapterState::Disabled);
    assert!(matches!(
        session.discover().await,
        Err(LinkError::DiscoveryFailed(_))
    ));

    endpoint.set_settings_outcome(Some(true));
    session.enable().await.unwrap();
    assert_eq!(session.adapter_state().await, AdapterState::Enabled);
}

#[tokio::test]
async fn test_bridge_chat_between_sessions() {
    let pair = MemoryPair::new().unwrap();
    let alice = Bridge::new(pair.responder.clone());
    let phone = Bridge::new(pair.initiator.clone());

    let advertise = alice.handle("startAdvertising", "[]").await.into_reply();
    assert_eq!(advertise, Some(Reply::ok()));

    let mut events = pair.responder.subscribe();
    let found = phone.handle("discoverDevices", "[]").await.into_reply().unwrap();
    assert_eq!(
        found.payload,
        Some(serde_json::json!([{"name": "Alice", "address": "unknown"}]))
    );

    let connect = phone
        .handle("connect", r#"["{\"address\":\"Alice\",\"message\":\"first\"}"]"#)
        .await
        .into_reply()
        .unwrap();
    assert!(connect.is_ok(), "{connect:?}");
    wait_for_inbound(&mut events).await.unwrap();

    let mut channel = alice.handle("read", "[]").await.into_channel().unwrap();
    assert_eq!(channel.next().await, Some(Reply::ok().keep()));
    assert_eq!(channel.next().await, Some(Reply::ok_with("first").keep()));

    let second_read = alice.handle("read", "[]").await.into_reply().unwrap();
    assert_eq!(second_read, Reply::ok().keep());

    let sent = phone
        .handle("send", r#"[{"message":"again"}]"#)
        .await
        .into_reply()
        .unwrap();
    assert!(sent.is_ok());
    assert_eq!(channel.next().await, Some(Reply::ok_with("again").keep()));

    let bad = phone.handle("send", r#"[{"message":""}]"#).await.into_reply().unwrap();
    assert_eq!(bad.status, ReplyStatus::JsonError);
}

// ============================================================================
// TCP radio on loopback
// ============================================================================

#[tokio::test]
async fn test_tcp_sessions_exchange_messages() {
    let pair = TcpPair::new().await.unwrap();

    let peers = pair.initiator.discover().await.unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].display_name, RESPONDER);
    assert_eq!(peers[0].host_address, pair.responder_addr.to_string());

    pair.connect().await.unwrap();
    let mut at_responder = pair.responder.start_listening().await.unwrap();
    let mut at_initiator = pair.initiator.start_listening().await.unwrap();

    pair.initiator.send("over tcp").await.unwrap();
    assert_eq!(
        at_responder.next_message().await.unwrap().as_deref(),
        Some("over tcp")
    );

    pair.responder.send("ack").await.unwrap();
    assert_eq!(
        at_initiator.next_message().await.unwrap().as_deref(),
        Some("ack")
    );

    pair.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_tcp_connect_payload_arrives_first() {
    let pair = TcpPair::new().await.unwrap();
    let mut events = pair.responder.subscribe();

    pair.initiator.discover().await.unwrap();
    let request = ConnectionRequest::new(RESPONDER).with_payload("opening line");
    pair.initiator.connect(request).await.unwrap();
    let peer = wait_for_inbound(&mut events).await.unwrap();
    assert_eq!(peer.display_name, INITIATOR);

    let mut at_responder = pair.responder.start_listening().await.unwrap();
    pair.initiator.send("follow-up").await.unwrap();

    assert_eq!(
        at_responder.next_message().await.unwrap().as_deref(),
        Some("opening line")
    );
    assert_eq!(
        at_responder.next_message().await.unwrap().as_deref(),
        Some("follow-up")
    );
}

#[tokio::test]
async fn test_tcp_discovery_skips_silent_peers() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let silent_addr = listener.local_addr().unwrap();
    // Accept and hold connections without answering
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let radio = proxima_transport::TcpRadio::new(
        proxima_transport::TcpRadioConfig::new("phone")
            .with_peer("Ghost", silent_addr)
            .with_handshake_timeout(Duration::from_millis(100)),
    )
    .unwrap();
    let session = Session::new(Arc::new(radio)).unwrap();

    assert!(matches!(
        session.discover().await,
        Err(LinkError::NoDevicesFound)
    ));
}
