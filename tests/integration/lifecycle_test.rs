// tests/integration/lifecycle_test.rs

use super::test_helpers::{TestServer, connect, read_text, test_config};
use std::time::{Duration, Instant};
use wsplex::connection::{Message, SessionId};
use wsplex::core::{ControlPlane, WsplexError};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_peer_disconnect_removes_session() {
    let server = TestServer::start().await;
    let (client, session_id) = connect(&server.ws_url());
    server.wait_for_connections(1).await;
    assert!(server.state.registry.get_by_session(session_id.as_str()).is_some());

    drop(client);
    server.wait_for_connections(0).await;
    assert!(server.state.registry.get_by_session(session_id.as_str()).is_none());
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_wrong_path_is_refused() {
    let server = TestServer::start().await;
    let url = format!("ws://{}/elsewhere", server.ws_addr);

    match tungstenite::connect(url.as_str()) {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 404),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("upgrade on the wrong path should fail"),
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.state.registry.is_empty());
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_max_clients_rejects_extra_connections() {
    let mut config = test_config();
    config.max_clients = 1;
    let server = TestServer::with_config(config).await;

    let (_first, _) = connect(&server.ws_url());
    server.wait_for_connections(1).await;

    assert!(tungstenite::connect(server.ws_url().as_str()).is_err());
    assert_eq!(server.state.registry.len(), 1);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_closes_every_session() {
    let server = TestServer::start().await;
    let (mut client, _) = connect(&server.ws_url());
    server.wait_for_connections(1).await;
    let state = server.state.clone();

    server.shutdown().await;

    assert!(state.registry.is_empty());
    assert!(state.is_shutting_down());
    // The close frame (or EOF) ends the client's stream.
    loop {
        match client.read() {
            Ok(tungstenite::Message::Close(_)) => continue,
            Ok(_) => continue,
            Err(_) => break,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_session_does_not_delay_others() {
    let mut config = test_config();
    config.workers.count = 64;
    config.write_timeout_ms = 3000;
    let server = TestServer::with_config(config).await;
    let (mut stalled, stalled_id) = connect(&server.ws_url());
    let (mut healthy, healthy_id) = connect(&server.ws_url());
    server.wait_for_connections(2).await;

    // Different worker shards, so only the read path is shared.
    let shard = |id: &SessionId| {
        server
            .state
            .registry
            .get_by_session(id.as_str())
            .unwrap()
            .descriptor()
            % 64
    };
    assert_ne!(shard(&stalled_id), shard(&healthy_id));

    // The stalled client never reads, so a large push fills its socket.
    let control = ControlPlane::new(server.state.clone());
    let push = tokio::spawn(async move {
        control
            .push_async(stalled_id, Message::text("x".repeat(16 * 1024 * 1024)))
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    stalled
        .send(tungstenite::Message::text("still there"))
        .unwrap();
    let started = Instant::now();
    healthy.send(tungstenite::Message::text("ping")).unwrap();
    assert_eq!(read_text(&mut healthy), "ping");
    assert!(started.elapsed() < Duration::from_secs(1));

    assert_eq!(push.await.unwrap(), Err(WsplexError::WriteTimeout(3000)));
    server.wait_for_connections(1).await;
    drop(stalled);
    server.shutdown().await;
}
