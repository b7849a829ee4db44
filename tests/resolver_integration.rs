//! Tests for the HTTP metadata resolver against a mock endpoint.

use std::time::Duration;

use idfetch_core::download::{ClientSettings, RetryPolicy};
use idfetch_core::resolver::{HttpMetadataResolver, ResolveError, ResolveOutcome, Resolver};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

fn resolver(server: &MockServer, ceiling: u32) -> HttpMetadataResolver {
    HttpMetadataResolver::new(format!("{}/meta/{{id}}", server.uri()), &ClientSettings::default())
        .unwrap()
        .with_retry_policy(RetryPolicy::new(ceiling, Duration::ZERO, Duration::ZERO))
}

#[tokio::test]
async fn test_transient_status_is_retried_until_found() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/meta/4"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/meta/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "title": "Four",
            "tags": ["Some Tag"],
            "qualities": [{"label": "480p", "link": "https://cdn.example.com/4.mp4"}]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = resolver(&mock_server, 3).resolve(4).await.unwrap();

    let ResolveOutcome::Found(metadata) = outcome else {
        panic!("expected metadata, got {outcome:?}");
    };
    assert_eq!(metadata.title, "Four");
    assert_eq!(metadata.tags, Some(vec!["some_tag".to_string()]));
}

#[tokio::test]
async fn test_transient_status_gives_up_after_ceiling() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/meta/4"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let result = resolver(&mock_server, 1).resolve(4).await;

    assert!(matches!(result, Err(ResolveError::HttpStatus { id: 4, status: 500 })));
}

#[tokio::test]
async fn test_missing_item_is_not_retried() {
    let Some(mock_server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/meta/9"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let outcome = resolver(&mock_server, 3).resolve(9).await.unwrap();

    assert!(matches!(outcome, ResolveOutcome::NotFound));
}
