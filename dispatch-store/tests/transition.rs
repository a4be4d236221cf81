//! Integration-shaped tests for `EventStore` against a wiremock stand-in
//! for Elasticsearch. No live cluster required: wiremock serves the
//! exact HTTP responses the client would see, so these exercise the
//! conditional-transition and cache-lookup wire contracts end to end.

use chrono::Utc;
use dispatch_store::{EventStore, StoreConfig, StoreError};
use dispatch_types::{Event, TaskStatus};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn store_against(server: &MockServer) -> EventStore {
    let addr = server.address();
    let config = StoreConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        username: None,
        password: None,
        index: "events".to_string(),
    };
    EventStore::new(&config).expect("failed to build event store client")
}

fn sample_event(message_id: &str, status: &str) -> serde_json::Value {
    json!({
        "message_id": message_id,
        "batch_id": "batch-1",
        "custom_id": "custom-1",
        "method": "POST",
        "url": "https://upstream.example/v1/chat/completions",
        "body": { "model": "test" },
        "body_hash": "deadbeef",
        "status": status,
        "cached": false,
        "attempt": 0,
        "result": null,
        "prompt_tokens": 0,
        "completion_tokens": 0,
        "total_tokens": 0,
        "created_at": Utc::now().to_rfc3339(),
        "started_at": null,
        "completed_at": null,
        "duration": null,
        "dataset": null,
        "source": null,
    })
}

#[tokio::test]
async fn transition_succeeds_when_status_and_seq_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events/_doc/msg-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "found": true,
            "_seq_no": 4,
            "_primary_term": 1,
            "_source": sample_event("msg-1", "PENDING"),
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/events/_update/msg-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "updated" })))
        .mount(&server)
        .await;

    let store = store_against(&server).await;
    let result = store
        .transition("msg-1", TaskStatus::Pending, TaskStatus::Processing, json!({ "started_at": Utc::now() }))
        .await;

    assert!(result.is_ok(), "expected transition to succeed, got {result:?}");
}

#[tokio::test]
async fn transition_conflicts_when_current_status_does_not_match_expected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events/_doc/msg-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "found": true,
            "_seq_no": 7,
            "_primary_term": 1,
            "_source": sample_event("msg-2", "PROCESSING"),
        })))
        .mount(&server)
        .await;

    let store = store_against(&server).await;
    let result = store
        .transition("msg-2", TaskStatus::Pending, TaskStatus::Processing, json!({}))
        .await;

    assert!(matches!(result, Err(StoreError::Conflict(id)) if id == "msg-2"));
}

#[tokio::test]
async fn transition_not_found_when_document_missing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events/_doc/msg-missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "found": false })))
        .mount(&server)
        .await;

    let store = store_against(&server).await;
    let result = store
        .transition("msg-missing", TaskStatus::Pending, TaskStatus::Processing, json!({}))
        .await;

    assert!(matches!(result, Err(StoreError::NotFound(id)) if id == "msg-missing"));
}

#[tokio::test]
async fn transition_conflicts_on_concurrent_write_even_when_status_matched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events/_doc/msg-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "found": true,
            "_seq_no": 2,
            "_primary_term": 1,
            "_source": sample_event("msg-3", "PROCESSING"),
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/events/_update/msg-3"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({ "error": "version_conflict_engine_exception" })))
        .mount(&server)
        .await;

    let store = store_against(&server).await;
    let result = store
        .transition("msg-3", TaskStatus::Processing, TaskStatus::Completed, json!({}))
        .await;

    assert!(matches!(result, Err(StoreError::Conflict(id)) if id == "msg-3"));
}

#[tokio::test]
async fn find_cached_completion_returns_the_matching_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hits": { "hits": [ { "_source": sample_event("msg-4", "COMPLETED") } ] }
        })))
        .mount(&server)
        .await;

    let store = store_against(&server).await;
    let hit = store.find_cached_completion("deadbeef").await.unwrap();

    assert_eq!(hit.unwrap().message_id, "msg-4");
}

#[tokio::test]
async fn find_cached_completion_returns_none_on_empty_hits() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events/_search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hits": { "hits": [] } })))
        .mount(&server)
        .await;

    let store = store_against(&server).await;
    let hit = store.find_cached_completion("deadbeef").await.unwrap();

    assert!(hit.is_none());
}

#[tokio::test]
async fn create_pending_bulk_is_a_noop_for_an_empty_slice() {
    let server = MockServer::start().await;
    // No mock registered for `_bulk`; if the client issued a request for
    // an empty batch, this test would fail with an unmatched-request panic.
    let store = store_against(&server).await;

    let result = store.create_pending_bulk(&[]).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn create_pending_bulk_indexes_events_with_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errors": false, "items": [] })))
        .mount(&server)
        .await;

    let store = store_against(&server).await;
    let event = Event::new_pending(
        "msg-5".to_string(),
        Some("batch-1".to_string()),
        "custom-1".to_string(),
        "POST".to_string(),
        "https://upstream.example".to_string(),
        json!({ "model": "test" }),
        None,
        None,
        Utc::now(),
    );

    let result = store.create_pending_bulk(&[event]).await;
    assert!(result.is_ok());
}
