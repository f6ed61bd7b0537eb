//! Integration tests for page fetching and body classification

use std::collections::BTreeMap;

use riksync_api::mapper::extract_items;
use riksync_api::ApiError;
use riksync_core::domain::ResourceType;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_fetch_members_page() {
    let (server, client) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/personlista/"))
        .and(query_param("utformat", "json"))
        .and(query_param("antal", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::person_page()))
        .expect(1)
        .mount(&server)
        .await;

    let url = client
        .url_builder()
        .build_url(ResourceType::Members, &BTreeMap::new(), 0, 100)
        .expect("url");
    let page = client.fetch_json(url.as_str()).await.expect("fetch");

    let payload = page.payload.expect("payload present");
    assert_eq!(extract_items(ResourceType::Members, &payload).len(), 1);
}

#[tokio::test]
async fn test_speeches_query_carries_filters() {
    let (server, client) = common::setup().await;

    Mock::given(method("GET"))
        .and(path("/anforandelista/"))
        .and(query_param("anf_datum_from", "2024-01-01"))
        .and(query_param("anf_datum_tom", ""))
        .and(query_param("parti", "S"))
        .and(query_param("sz", "100"))
        .and(query_param("p", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "anforandelista": { "anforande": [] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let filters: BTreeMap<String, String> = [
        ("anf_datum_from".to_string(), "2024-01-01".to_string()),
        ("parti".to_string(), "S".to_string()),
    ]
    .into_iter()
    .collect();
    let url = client
        .url_builder()
        .build_url(ResourceType::Speeches, &filters, 200, 100)
        .expect("url");
    let page = client.fetch_json(url.as_str()).await.expect("fetch");
    assert!(page.payload.is_some());
}

#[tokio::test]
async fn test_empty_body_is_no_payload() {
    let (server, client) = common::setup().await;
    common::mount_route(&server, "/voteringlista/", ResponseTemplate::new(200), 1).await;

    let page = client
        .fetch_json(&format!("{}/voteringlista/?utformat=json", server.uri()))
        .await
        .expect("fetch");
    assert!(page.payload.is_none());
}

#[tokio::test]
async fn test_html_body_is_invalid_content_type() {
    let (server, client) = common::setup().await;
    common::mount_route(
        &server,
        "/dokumentlista/",
        ResponseTemplate::new(200).set_body_raw("<html>maintenance</html>", "text/html"),
        1,
    )
    .await;

    let err = client
        .fetch_json(&format!("{}/dokumentlista/", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidContentType(ct) if ct.starts_with("text/html")));
}

#[tokio::test]
async fn test_undecodable_json_is_terminal() {
    let (server, client) = common::setup().await;
    common::mount_route(
        &server,
        "/dokumentlista/",
        ResponseTemplate::new(200).set_body_raw("{\"dokumentlista\": ", "application/json"),
        1,
    )
    .await;

    let err = client
        .fetch_json(&format!("{}/dokumentlista/", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let (server, client) = common::setup().await;
    common::mount_route(&server, "/personlista/", ResponseTemplate::new(404), 1).await;

    let err = client
        .fetch_json(&format!("{}/personlista/", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_uri_too_long_is_not_retried() {
    let (server, client) = common::setup().await;
    common::mount_route(&server, "/anforandelista/", ResponseTemplate::new(414), 1).await;

    let err = client
        .fetch_json(&format!("{}/anforandelista/", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::PayloadTooLarge { status: 414 }));
}
