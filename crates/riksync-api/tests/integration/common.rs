//! Shared test helpers for open-data API integration tests
//!
//! Provides a wiremock server plus a fast configuration (millisecond
//! backoff, no jitter, health check off) pointing at it.

use riksync_api::client::OpenDataClient;
use riksync_core::config::{Config, ConfigBuilder};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Configuration builder preset for tests against `server`.
pub fn fast_config(server: &MockServer) -> ConfigBuilder {
    ConfigBuilder::new()
        .api_base_url(server.uri())
        .requests_per_second(100)
        .retry_max_retries(3)
        .retry_delays_ms(10, 50)
        .retry_jitter(false)
        .retry_network(1, 10)
        .retry_max_attempts(8)
        .health_check_enabled(false)
}

/// Starts a mock server and a client built from [`fast_config`].
pub async fn setup() -> (MockServer, OpenDataClient) {
    let server = MockServer::start().await;
    let client = client_for(fast_config(&server).build());
    (server, client)
}

pub fn client_for(config: Config) -> OpenDataClient {
    OpenDataClient::new(&config).expect("client should build")
}

/// A one-member personlista payload.
pub fn person_page() -> serde_json::Value {
    serde_json::json!({
        "personlista": {
            "@hits": "1",
            "person": {
                "intressent_id": "0980681474010",
                "tilltalsnamn": "Anna",
                "efternamn": "Andersson",
                "parti": "S",
                "fodd_ar": "1970"
            }
        }
    })
}

/// Mounts `template` for every GET on `route`, expecting `calls` hits.
pub async fn mount_route(server: &MockServer, route: &str, template: ResponseTemplate, calls: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(template)
        .expect(calls)
        .mount(server)
        .await;
}
