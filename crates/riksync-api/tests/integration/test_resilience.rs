//! Integration tests for retries, circuit breaking and health checking

use std::time::{Duration, Instant};

use riksync_api::circuit_breaker::CircuitState;
use riksync_api::ApiError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

// ============================================================================
// Retry tests
// ============================================================================

#[tokio::test]
async fn test_server_error_is_retried_then_succeeds() {
    let (server, client) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/personlista/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    common::mount_route(
        &server,
        "/personlista/",
        ResponseTemplate::new(200).set_body_json(common::person_page()),
        1,
    )
    .await;

    let page = client
        .fetch_json(&format!("{}/personlista/", server.uri()))
        .await
        .expect("should succeed on third attempt");
    assert!(page.payload.is_some());
    assert_eq!(client.circuit_breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_retry_after_is_honored() {
    let (server, client) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/voteringlista/"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    common::mount_route(
        &server,
        "/voteringlista/",
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "voteringlista": { "votering": [] }
        })),
        1,
    )
    .await;

    let start = Instant::now();
    client
        .fetch_json(&format!("{}/voteringlista/", server.uri()))
        .await
        .expect("should succeed after cooldown");
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert!(client.rate_limiter().effective_capacity() < 100);
}

#[tokio::test]
async fn test_attempt_ceiling_returns_retries_exhausted() {
    let server = MockServer::start().await;
    let config = common::fast_config(&server)
        .retry_max_retries(10)
        .retry_max_attempts(3)
        .circuit_failure_threshold(100)
        .build();
    let client = common::client_for(config);
    common::mount_route(&server, "/dokumentlista/", ResponseTemplate::new(500), 3).await;

    let err = client
        .fetch_json(&format!("{}/dokumentlista/", server.uri()))
        .await
        .unwrap_err();
    match err {
        ApiError::RetriesExhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("500"), "{}", last_error);
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_timeout_uses_network_budget() {
    let server = MockServer::start().await;
    let config = common::fast_config(&server).request_timeout_secs(1).build();
    let client = common::client_for(config);
    common::mount_route(
        &server,
        "/personlista/",
        ResponseTemplate::new(200)
            .set_body_json(common::person_page())
            .set_delay(Duration::from_secs(3)),
        2,
    )
    .await;

    let err = client
        .fetch_json(&format!("{}/personlista/", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Timeout(_)), "{:?}", err);
}

// ============================================================================
// Circuit breaker tests
// ============================================================================

#[tokio::test]
async fn test_open_circuit_rejects_without_network_call() {
    let server = MockServer::start().await;
    let config = common::fast_config(&server)
        .retry_max_retries(0)
        .circuit_failure_threshold(2)
        .circuit_recovery_timeout_ms(60_000)
        .build();
    let client = common::client_for(config);
    // Only the two tripping calls may reach the server
    common::mount_route(&server, "/anforandelista/", ResponseTemplate::new(502), 2).await;

    let url = format!("{}/anforandelista/", server.uri());
    for _ in 0..2 {
        let err = client.fetch_json(&url).await.unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 502 }));
    }
    assert_eq!(client.circuit_breaker().state(), CircuitState::Open);

    let err = client.fetch_json(&url).await.unwrap_err();
    assert!(matches!(err, ApiError::CircuitOpen));
}

#[tokio::test]
async fn test_not_found_does_not_trip_circuit() {
    let server = MockServer::start().await;
    let config = common::fast_config(&server).circuit_failure_threshold(1).build();
    let client = common::client_for(config);
    common::mount_route(&server, "/personlista/", ResponseTemplate::new(404), 3).await;

    let url = format!("{}/personlista/", server.uri());
    for _ in 0..3 {
        assert!(matches!(
            client.fetch_json(&url).await,
            Err(ApiError::NotFound(_))
        ));
    }
    assert_eq!(client.circuit_breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_cancelled_half_open_trial_does_not_wedge_circuit() {
    let server = MockServer::start().await;
    let config = common::fast_config(&server)
        .retry_max_retries(0)
        .circuit_failure_threshold(1)
        .circuit_success_threshold(1)
        .circuit_recovery_timeout_ms(50)
        .build();
    let client = common::client_for(config);

    Mock::given(method("GET"))
        .and(path("/personlista/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/personlista/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::person_page())
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let url = format!("{}/personlista/", server.uri());
    assert!(matches!(
        client.fetch_json(&url).await,
        Err(ApiError::Server { status: 503 })
    ));
    assert_eq!(client.circuit_breaker().state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;

    // The trial is admitted, then abandoned mid-request
    let abandoned = tokio::time::timeout(Duration::from_millis(100), client.fetch_json(&url)).await;
    assert!(abandoned.is_err());

    let snapshot = client.circuit_breaker().snapshot();
    assert_eq!(snapshot.state, CircuitState::HalfOpen);
    assert_eq!(snapshot.half_open_in_flight, 0);

    let page = client.fetch_json(&url).await.expect("next trial is admitted");
    assert!(page.payload.is_some());
    assert_eq!(client.circuit_breaker().state(), CircuitState::Closed);
}

// ============================================================================
// Health check tests
// ============================================================================

#[tokio::test]
async fn test_unhealthy_upstream_short_circuits() {
    let server = MockServer::start().await;
    let config = common::fast_config(&server)
        .health_check_enabled(true)
        .health_check_path("/health")
        .health_check_interval_secs(300)
        .build();
    let client = common::client_for(config);

    // Probed once; the verdict is cached for the interval
    common::mount_route(&server, "/health", ResponseTemplate::new(503), 1).await;
    common::mount_route(&server, "/personlista/", ResponseTemplate::new(200), 0).await;

    let url = format!("{}/personlista/", server.uri());
    for _ in 0..2 {
        assert!(matches!(
            client.fetch_json(&url).await,
            Err(ApiError::Unhealthy)
        ));
    }
}

#[tokio::test]
async fn test_client_error_probe_counts_as_healthy() {
    let server = MockServer::start().await;
    let config = common::fast_config(&server)
        .health_check_enabled(true)
        .health_check_path("/health")
        .build();
    let client = common::client_for(config);

    common::mount_route(&server, "/health", ResponseTemplate::new(404), 1).await;
    common::mount_route(
        &server,
        "/personlista/",
        ResponseTemplate::new(200).set_body_json(common::person_page()),
        2,
    )
    .await;

    let url = format!("{}/personlista/", server.uri());
    client.fetch_json(&url).await.expect("first fetch");
    client.fetch_json(&url).await.expect("second fetch uses cached verdict");
}
