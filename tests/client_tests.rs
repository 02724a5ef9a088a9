//! Partner client integration tests against a wiremock server: retry
//! behavior, envelope handling, signing headers, and the circuit breaker.

use dealersync::client::{CircuitState, DealerCredentials, PartnerClient};
use dealersync::config::PartnerClientConfig;
use dealersync::error::IngestError;
use serde_json::json;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn credentials() -> DealerCredentials {
    DealerCredentials {
        app_key: "test-app-key".to_string(),
        app_secret: "test-app-secret".to_string(),
    }
}

fn client_for(server: &MockServer, max_retries: u32, breaker_threshold: u32) -> PartnerClient {
    let config = PartnerClientConfig {
        base_url: server.uri(),
        max_retries,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 50,
        breaker_failure_threshold: breaker_threshold,
        breaker_recovery_timeout_seconds: 60,
        ..PartnerClientConfig::default()
    };
    PartnerClient::new(config).expect("build client")
}

#[tokio::test]
async fn fetch_sends_signed_request_and_parses_envelope() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/serviceOrder/list"))
        .and(header_exists("appKey"))
        .and(header_exists("timestamp"))
        .and(header_exists("sign"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 1,
            "message": "ok",
            "data": [{"orderNo": "SO-1"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3, 5);
    let response = client
        .fetch("serviceOrder/list", &credentials(), &json!({"dealerId": "d1"}))
        .await
        .expect("fetch succeeds");

    assert_eq!(response.status, 1);
    assert_eq!(response.records().unwrap().len(), 1);
    assert_eq!(client.breaker_stats().consecutive_failures, 0);
}

#[tokio::test]
async fn transient_server_errors_are_retried_until_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/invoice/list"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/invoice/list"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": 1, "data": []})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3, 5);
    let response = client
        .fetch("invoice/list", &credentials(), &json!({}))
        .await
        .expect("retries recover");

    assert_eq!(response.status, 1);
    assert_eq!(client.breaker_stats().state, CircuitState::Closed);
}

#[tokio::test]
async fn retries_exhausted_returns_transient_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, 2, 5);
    let err = client
        .fetch("delivery/list", &credentials(), &json!({}))
        .await
        .expect_err("all retries fail");

    assert!(matches!(err, IngestError::TransientNetwork { .. }));
    assert_eq!(client.breaker_stats().consecutive_failures, 1);
}

#[tokio::test]
async fn application_rejection_is_not_retried_and_not_a_breaker_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": 0,
            "message": "invalid window"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3, 5);
    let err = client
        .fetch("invoice/list", &credentials(), &json!({}))
        .await
        .expect_err("rejected envelope");

    match err {
        IngestError::FetchRejected { message } => assert_eq!(message, "invalid window"),
        other => panic!("unexpected error: {:?}", other),
    }
    // The partner answered, so the breaker saw a success.
    assert_eq!(client.breaker_stats().consecutive_failures, 0);
    assert_eq!(client.breaker_stats().state, CircuitState::Closed);
}

#[tokio::test]
async fn empty_body_is_malformed_and_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 3, 5);
    let err = client
        .fetch("invoice/list", &credentials(), &json!({}))
        .await
        .expect_err("empty body");

    assert!(matches!(err, IngestError::MalformedResponse { .. }));
    assert_eq!(client.breaker_stats().consecutive_failures, 1);
}

#[tokio::test]
async fn breaker_opens_after_threshold_and_rejects_without_calling() {
    let server = MockServer::start().await;

    // Two failed fetches reach the threshold; the third never hits the wire.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, 0, 2);

    for _ in 0..2 {
        let err = client
            .fetch("invoice/list", &credentials(), &json!({}))
            .await
            .expect_err("transport failure");
        assert!(matches!(err, IngestError::TransientNetwork { .. }));
    }
    assert_eq!(client.breaker_stats().state, CircuitState::Open);

    let err = client
        .fetch("invoice/list", &credentials(), &json!({}))
        .await
        .expect_err("breaker rejects");
    match err {
        IngestError::CircuitOpen { retry_in_seconds } => assert!(retry_in_seconds <= 60),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(client.breaker_stats().total_rejected, 1);
}
