//! Integration tests for stage 1 against a real HTTP stack.
//!
//! Uses `wiremock` to stand up a local server for each test so no real
//! network traffic is made.

use std::time::Duration;

use livecheck_core::{AdmissionConfig, FailureKind, ProbeMethod};
use livecheck_probe::{AdmissionProber, HttpReachabilityClient, ReachabilityClient};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client() -> HttpReachabilityClient {
    HttpReachabilityClient::new("livecheck-test/0.1").expect("failed to build test client")
}

fn test_config() -> AdmissionConfig {
    AdmissionConfig {
        initial_concurrency: 4,
        min_concurrency: 1,
        max_concurrency: 8,
        initial_timeout_secs: 5,
        min_timeout_secs: 1,
        max_timeout_secs: 10,
        max_attempts: 2,
        backoff_base_ms: 0,
        ..AdmissionConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Reachability client
// ---------------------------------------------------------------------------

#[tokio::test]
async fn head_returns_status() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/live.m3u8"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let status = test_client()
        .head(&format!("{}/live.m3u8", server.uri()), Duration::from_secs(5))
        .await
        .expect("head should succeed");
    assert_eq!(status, 200);
}

#[tokio::test]
async fn fetch_prefix_stops_at_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stream.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x47u8; 64 * 1024]))
        .mount(&server)
        .await;

    let read = test_client()
        .fetch_prefix(
            &format!("{}/stream.ts", server.uri()),
            Duration::from_secs(5),
            1024,
        )
        .await
        .expect("fetch should succeed");
    assert_eq!(read.status, 200);
    assert!(read.bytes_read >= 1024);
}

#[tokio::test]
async fn fetch_prefix_skips_body_on_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    let read = test_client()
        .fetch_prefix(&format!("{}/gone", server.uri()), Duration::from_secs(5), 1024)
        .await
        .expect("fetch should return the status");
    assert_eq!(read.status, 404);
    assert_eq!(read.bytes_read, 0);
}

// ---------------------------------------------------------------------------
// Prober over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn head_success_is_reachable_via_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let url = format!("{}/ok.m3u8", server.uri());
    let prober = AdmissionProber::new(test_client(), test_config());
    let results = prober.run(&[url.clone()]).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, url);
    assert!(results[0].reachable);
    assert_eq!(results[0].method_used, Some(ProbeMethod::Head));
    assert!(results[0].latency_ms.is_some());
}

#[tokio::test]
async fn method_not_allowed_falls_back_to_get() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 512]))
        .mount(&server)
        .await;

    let url = format!("{}/nohead.m3u8", server.uri());
    let results = AdmissionProber::new(test_client(), test_config())
        .run(&[url])
        .await;

    assert!(results[0].reachable);
    assert_eq!(results[0].method_used, Some(ProbeMethod::Get));
    assert_eq!(results[0].status, Some(200));
}

#[tokio::test]
async fn redirect_status_counts_as_reachable() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let url = format!("{}/cached.m3u8", server.uri());
    let results = AdmissionProber::new(test_client(), test_config())
        .run(&[url])
        .await;
    assert!(results[0].reachable);
    assert_eq!(results[0].status, Some(304));
}

#[tokio::test]
async fn not_found_fails_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/missing.m3u8", server.uri());
    let results = AdmissionProber::new(test_client(), test_config())
        .run(&[url])
        .await;

    let r = &results[0];
    assert!(!r.reachable);
    assert_eq!(r.attempts, 1);
    assert_eq!(r.status, Some(404));
    assert_eq!(r.error.as_ref().map(|e| e.kind), Some(FailureKind::Network));
}

#[tokio::test]
async fn server_error_is_retried_up_to_limit() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let url = format!("{}/flaky.m3u8", server.uri());
    let results = AdmissionProber::new(test_client(), test_config())
        .run(&[url])
        .await;
    assert!(!results[0].reachable);
    assert_eq!(results[0].attempts, 2);
}

#[tokio::test]
async fn connection_refused_is_unreachable() {
    // Bind then drop a server so its port is closed.
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };

    let results = AdmissionProber::new(test_client(), test_config())
        .run(&[format!("{uri}/live.m3u8")])
        .await;

    let r = &results[0];
    assert!(!r.reachable);
    assert_eq!(r.method_used, None);
    assert_eq!(r.error.as_ref().map(|e| e.kind), Some(FailureKind::Network));
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = AdmissionConfig {
        initial_timeout_secs: 1,
        min_timeout_secs: 1,
        max_attempts: 1,
        ..test_config()
    };
    let results = AdmissionProber::new(test_client(), config)
        .run(&[format!("{}/slow.m3u8", server.uri())])
        .await;
    assert!(!results[0].reachable);
    assert_eq!(results[0].error.as_ref().map(|e| e.kind), Some(FailureKind::Network));
}
