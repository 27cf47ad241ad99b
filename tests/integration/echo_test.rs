// tests/integration/echo_test.rs

use super::test_helpers::{TestServer, connect, read_text};
use tungstenite::Message as WsMessage;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_echo_round_trip() {
    let server = TestServer::start().await;
    let (mut client, _session) = connect(&server.ws_url());
    server.wait_for_connections(1).await;

    client.send(WsMessage::text("hello")).unwrap();
    assert_eq!(read_text(&mut client), "hello");

    client.close(None).unwrap();
    server.wait_for_connections(0).await;
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_echo_preserves_order_per_session() {
    let server = TestServer::start().await;
    let (mut client, _session) = connect(&server.ws_url());
    server.wait_for_connections(1).await;

    for i in 0..50 {
        client.send(WsMessage::text(format!("msg-{i}"))).unwrap();
    }
    for i in 0..50 {
        assert_eq!(read_text(&mut client), format!("msg-{i}"));
    }
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_echo_binary_message() {
    let server = TestServer::start().await;
    let (mut client, _session) = connect(&server.ws_url());
    server.wait_for_connections(1).await;

    client.send(WsMessage::binary(vec![0u8, 1, 2, 255])).unwrap();
    loop {
        match client.read().unwrap() {
            WsMessage::Binary(data) => {
                assert_eq!(&data[..], &[0u8, 1, 2, 255]);
                break;
            }
            WsMessage::Text(_) => panic!("expected a binary echo"),
            _ => continue,
        }
    }
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_are_isolated() {
    let server = TestServer::start().await;
    let (mut alice, alice_id) = connect(&server.ws_url());
    let (mut bob, bob_id) = connect(&server.ws_url());
    assert_ne!(alice_id, bob_id);
    server.wait_for_connections(2).await;

    alice.send(WsMessage::text("from alice")).unwrap();
    bob.send(WsMessage::text("from bob")).unwrap();
    assert_eq!(read_text(&mut alice), "from alice");
    assert_eq!(read_text(&mut bob), "from bob");

    let stats = &server.state.stats;
    assert_eq!(stats.get_total_connections(), 2);
    assert!(stats.get_messages_received() >= 2);
    server.shutdown().await;
}
