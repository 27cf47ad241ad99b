// tests/integration/broadcast_test.rs

use super::test_helpers::{TestServer, connect, read_text};
use wsplex::server::AnnounceResponse;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_announce_reaches_every_session() {
    let server = TestServer::start().await;
    let mut clients: Vec<_> = (0..3).map(|_| connect(&server.ws_url()).0).collect();
    server.wait_for_connections(3).await;

    let response = reqwest::Client::new()
        .post(server.control_url("/announce"))
        .body("maintenance at noon")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let report: AnnounceResponse = response.json().await.unwrap();
    assert_eq!(
        report,
        AnnounceResponse {
            delivered: 3,
            failed: 0
        }
    );

    for client in &mut clients {
        assert_eq!(read_text(client), "maintenance at noon");
    }
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_announce_with_no_sessions() {
    let server = TestServer::start().await;

    let response = reqwest::Client::new()
        .post(server.control_url("/announce"))
        .body("anyone?")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let report: AnnounceResponse = response.json().await.unwrap();
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed, 0);
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_announce_rejects_non_utf8_body() {
    let server = TestServer::start().await;

    let response = reqwest::Client::new()
        .post(server.control_url("/announce"))
        .body(vec![0xff, 0xfe, 0xfd])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    server.shutdown().await;
}
