// tests/integration/push_test.rs

use super::test_helpers::{TestServer, connect, read_text};
use wsplex::connection::SessionId;
use wsplex::server::StatsResponse;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_push_reaches_only_target_session() {
    let server = TestServer::start().await;
    let (mut target, target_id) = connect(&server.ws_url());
    let (mut other, _) = connect(&server.ws_url());
    server.wait_for_connections(2).await;

    let response = reqwest::Client::new()
        .post(server.control_url("/push"))
        .query(&[("sessionID", target_id.as_str())])
        .body("just for you")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(read_text(&mut target), "just for you");

    // The other session only sees its own echo.
    other.send(tungstenite::Message::text("mine")).unwrap();
    assert_eq!(read_text(&mut other), "mine");
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_push_unknown_session_is_not_found() {
    let server = TestServer::start().await;

    let response = reqwest::Client::new()
        .post(server.control_url("/push"))
        .query(&[("sessionID", SessionId::generate().as_str())])
        .body("hello?")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_push_rejects_malformed_session_id() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .post(server.control_url("/push"))
        .query(&[("sessionID", "../../etc/passwd")])
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(server.control_url("/push"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stats_reports_counters() {
    let server = TestServer::start().await;
    let (mut client, _) = connect(&server.ws_url());
    server.wait_for_connections(1).await;

    client.send(tungstenite::Message::text("count me")).unwrap();
    assert_eq!(read_text(&mut client), "count me");

    // The sent counter is bumped just after the echo hits the socket.
    let mut stats: StatsResponse;
    let mut attempts = 0;
    loop {
        stats = reqwest::get(server.control_url("/stats"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        attempts += 1;
        if stats.messages_sent == 1 || attempts == 50 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(stats.connections, 1);
    assert_eq!(stats.total_connections, 1);
    assert_eq!(stats.messages_received, 1);
    assert_eq!(stats.messages_sent, 1);
    server.shutdown().await;
}
