use std::time::Duration;

use http_test_util::{TargetBehaviour, TargetServer};
use hyper::StatusCode;
use loadgen::{HttpClientFactory, LoadTest, LoadTestConfig};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn target_receives_exactly_the_budget() {
    let server = TargetServer::spawn(TargetBehaviour::default()).await.unwrap();
    let summary = LoadTest::new(
        LoadTestConfig::new(server.url(), 3, 9),
        HttpClientFactory::default(),
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(summary.completed, 9);
    assert_eq!(summary.totals.successes, 9);
    assert_eq!(summary.totals.failures, 0);
    assert_eq!(summary.idle_clients, 3);
    assert_eq!(server.hits(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn error_status_counts_as_failed_attempt() {
    let server = TargetServer::spawn(TargetBehaviour::status(StatusCode::INTERNAL_SERVER_ERROR))
        .await
        .unwrap();
    let summary = LoadTest::new(
        LoadTestConfig::new(server.url(), 2, 10),
        HttpClientFactory::default(),
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(summary.completed, 10);
    assert_eq!(summary.totals.failures, 10);
    assert_eq!(server.hits(), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_target_times_out_per_request() {
    let server = TargetServer::spawn(
        TargetBehaviour::default().with_delay(Duration::from_millis(500)),
    )
    .await
    .unwrap();
    let timeout = Duration::from_millis(50);
    let config = LoadTestConfig::new(server.url(), 1, 2).with_request_timeout(timeout);
    let summary = LoadTest::new(config, HttpClientFactory::new(Some(timeout)))
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.totals.failures, 2);
}

#[tokio::test]
async fn unreachable_target_fails_every_attempt() {
    // Bind then drop so the port is closed.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let summary = LoadTest::new(
        LoadTestConfig::new(format!("http://{addr}/"), 2, 4),
        HttpClientFactory::default(),
    )
    .run(CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(summary.completed, 4);
    assert_eq!(summary.totals.failures, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn https_target_attempts_a_tls_handshake() {
    // A plaintext listener cannot complete the handshake, so every attempt fails.
    let server = TargetServer::spawn(TargetBehaviour::default()).await.unwrap();
    let timeout = Duration::from_secs(2);
    let config = LoadTestConfig::new(format!("https://{}/", server.addr()), 1, 2)
        .with_request_timeout(timeout);
    let summary = LoadTest::new(config, HttpClientFactory::new(Some(timeout)))
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.completed, 2);
    assert_eq!(summary.totals.attempts, 2);
    assert_eq!(summary.totals.failures, 2);
    assert_eq!(server.hits(), 0);
}
