//! End-to-end tests over real sockets on loopback

use oscbridge_core::{Argument, Message};
use oscbridge_router::{Bridge, BridgeConfig, ClientStatus, RouterError};
use oscbridge_test_utils::{
    send_datagram, wait_for, OscTestReceiver, WsTestClient, DEFAULT_CHECK_INTERVAL,
    DEFAULT_TIMEOUT,
};
use rosc::{encoder, OscBundle, OscMessage, OscPacket, OscTime, OscType};
use serde_json::json;
use std::time::Duration;

async fn start_bridge(osc_out: &OscTestReceiver) -> Bridge {
    let mut config = BridgeConfig::local_ephemeral();
    config.outbound.port = osc_out.local_addr().port();
    Bridge::start(config).await.unwrap()
}

async fn connect(bridge: &Bridge, expected_clients: usize) -> WsTestClient {
    let client = WsTestClient::connect(bridge.ws_addr()).await;
    let registry = bridge.registry().clone();
    assert!(
        wait_for(
            || async { registry.len() >= expected_clients },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await,
        "client never registered"
    );
    client
}

fn osc(addr: &str, args: Vec<OscType>) -> OscPacket {
    OscPacket::Message(OscMessage {
        addr: addr.to_string(),
        args,
    })
}

#[tokio::test]
async fn test_inbound_osc_is_broadcast_as_json() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;
    let mut first = connect(&bridge, 1).await;
    let mut second = connect(&bridge, 2).await;

    let packet = encoder::encode(&osc("/fractal/zoom", vec![OscType::Float(2.5)])).unwrap();
    send_datagram(bridge.osc_addr(), &packet).await;

    let expected = json!({"address": "/fractal/zoom", "args": [2.5]});
    assert_eq!(first.next_json(DEFAULT_TIMEOUT).await, Some(expected.clone()));
    assert_eq!(second.next_json(DEFAULT_TIMEOUT).await, Some(expected));

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_bundle_messages_arrive_in_order() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;
    let mut client = connect(&bridge, 1).await;

    let bundle = OscPacket::Bundle(OscBundle {
        timetag: OscTime {
            seconds: 0,
            fractional: 1,
        },
        content: vec![osc("/a", vec![]), osc("/b", vec![OscType::Int(7)])],
    });
    send_datagram(bridge.osc_addr(), &encoder::encode(&bundle).unwrap()).await;

    assert_eq!(
        client.next_json(DEFAULT_TIMEOUT).await,
        Some(json!({"address": "/a", "args": []}))
    );
    assert_eq!(
        client.next_json(DEFAULT_TIMEOUT).await,
        Some(json!({"address": "/b", "args": [7]}))
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_datagrams_from_one_sender_arrive_in_order() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;
    let mut client = connect(&bridge, 1).await;

    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    for i in 0..5 {
        let packet = encoder::encode(&osc("/fractal/step", vec![OscType::Int(i)])).unwrap();
        socket.send_to(&packet, bridge.osc_addr()).await.unwrap();
    }

    for i in 0..5 {
        assert_eq!(
            client.next_json(DEFAULT_TIMEOUT).await,
            Some(json!({"address": "/fractal/step", "args": [i]}))
        );
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_garbage_datagram_is_ignored() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;
    let mut client = connect(&bridge, 1).await;

    send_datagram(bridge.osc_addr(), &[0x00, 0x00]).await;
    send_datagram(bridge.osc_addr(), b"no terminator at all").await;
    let packet = encoder::encode(&osc("/fractal/color", vec![OscType::Int(3)])).unwrap();
    send_datagram(bridge.osc_addr(), &packet).await;

    assert_eq!(
        client.next_json(DEFAULT_TIMEOUT).await,
        Some(json!({"address": "/fractal/color", "args": [3]}))
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_analysis_event_is_sent_as_osc() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;
    let mut client = connect(&bridge, 1).await;

    client
        .send_json(&json!({"type": "analysis", "address": "/audio/rms", "args": [0.5]}))
        .await;

    assert_eq!(
        osc_out.recv(DEFAULT_TIMEOUT).await,
        Some(Message::new("/audio/rms", vec![Argument::Float(0.5)]))
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_analysis_events_keep_client_order() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;
    let mut client = connect(&bridge, 1).await;

    for i in 0..5 {
        client
            .send_json(&json!({"type": "analysis", "address": "/audio/frame", "args": [i]}))
            .await;
    }

    for i in 0..5 {
        assert_eq!(
            osc_out.recv(DEFAULT_TIMEOUT).await,
            Some(Message::new("/audio/frame", vec![Argument::Int(i)]))
        );
    }

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_malformed_payloads_are_dropped() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;
    let mut client = connect(&bridge, 1).await;

    client.send_text("{not json").await;
    client.send_json(&json!({"type": "status", "address": "/x", "args": []})).await;
    client.send_json(&json!({"type": "analysis", "args": [1]})).await;
    client
        .send_json(&json!({"type": "analysis", "address": "/audio/bad", "args": [null]}))
        .await;
    client
        .send_binary(br#"{"type":"analysis","address":"/audio/beat","args":[true]}"#.to_vec())
        .await;

    // Only the binary-framed event makes it through
    assert_eq!(
        osc_out.recv(DEFAULT_TIMEOUT).await,
        Some(Message::new("/audio/beat", vec![Argument::Bool(true)]))
    );
    assert_eq!(bridge.registry().len(), 1);

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_client_disconnect_unregisters() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;
    let client = connect(&bridge, 1).await;

    client.close().await;

    let registry = bridge.registry().clone();
    assert!(
        wait_for(
            || async { registry.is_empty() },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_idle_tcp_peer_does_not_block_clients() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;

    // Connects but never sends the upgrade request
    let _idle = tokio::net::TcpStream::connect(bridge.ws_addr()).await.unwrap();

    let registered = tokio::time::timeout(Duration::from_secs(1), async {
        let client = WsTestClient::connect(bridge.ws_addr()).await;
        let registry = bridge.registry().clone();
        wait_for(
            || async { registry.len() == 1 },
            DEFAULT_CHECK_INTERVAL,
            DEFAULT_TIMEOUT,
        )
        .await;
        client
    })
    .await;
    assert!(registered.is_ok(), "client waited behind the idle peer");

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_answering_client_survives_liveness_sweeps() {
    let osc_out = OscTestReceiver::bind().await;
    let mut config = BridgeConfig::local_ephemeral();
    config.outbound.port = osc_out.local_addr().port();
    config.liveness_interval_secs = 1;
    let bridge = Bridge::start(config).await.unwrap();
    let mut client = connect(&bridge, 1).await;

    // Reading lets the client answer pings; no payload arrives meanwhile
    assert_eq!(client.next_json(Duration::from_millis(3500)).await, None);

    assert_eq!(bridge.registry().len(), 1);
    let state = bridge.registry().snapshot()[0].state();
    assert_eq!(state.status, ClientStatus::Open);

    // Still writable after three sweeps
    let packet = encoder::encode(&osc("/fractal/reset", vec![])).unwrap();
    send_datagram(bridge.osc_addr(), &packet).await;
    assert_eq!(
        client.next_json(DEFAULT_TIMEOUT).await,
        Some(json!({"address": "/fractal/reset", "args": []}))
    );

    bridge.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let osc_out = OscTestReceiver::bind().await;
    let bridge = start_bridge(&osc_out).await;
    let mut client = connect(&bridge, 1).await;
    let ws_addr = bridge.ws_addr();

    let closed = bridge.shutdown().await;
    assert_eq!(closed, 1);
    assert_eq!(
        client.next_close(DEFAULT_TIMEOUT).await.as_deref(),
        Some("server shutting down")
    );

    // The listener is gone
    let refused = tokio::time::timeout(
        Duration::from_secs(1),
        tokio::net::TcpStream::connect(ws_addr),
    )
    .await;
    assert!(!matches!(refused, Ok(Ok(_))));
}

#[tokio::test]
async fn test_bind_failure_is_fatal() {
    let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();

    let mut config = BridgeConfig::local_ephemeral();
    config.osc.port = taken.local_addr().unwrap().port();

    match Bridge::start(config).await {
        Err(RouterError::Bind { role, .. }) => assert_eq!(role, "inbound OSC"),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("bridge started on an occupied port"),
    }
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = BridgeConfig::local_ephemeral();
    config.liveness_interval_secs = 0;
    assert!(matches!(
        Bridge::start(config).await,
        Err(RouterError::Config(_))
    ));
}
