//! Integration-shaped tests for `ObjectStore` against a wiremock stand-in
//! for the S3-compatible endpoint. No live MinIO/S3 required.

use bytes::Bytes;
use dispatch_objectstore::{ObjectStore, ObjectStoreConfig, ObjectStoreError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUCKET: &str = "test-bucket";

async fn connect_against(server: &MockServer) -> ObjectStore {
    Mock::given(method("HEAD"))
        .and(path(format!("/{BUCKET}")))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;

    let config = ObjectStoreConfig {
        endpoint_url: server.uri(),
        access_key: "test-access-key".to_string(),
        secret_key: "test-secret-key".to_string(),
        bucket: BUCKET.to_string(),
        region: "us-east-1".to_string(),
    };
    ObjectStore::connect(&config).await.expect("failed to build object store client")
}

#[tokio::test]
async fn connect_skips_bucket_creation_when_head_bucket_succeeds() {
    let server = MockServer::start().await;
    // connect_against mounts only the head_bucket mock; create_bucket is
    // left unmocked so a stray call would fail this test with an
    // unmatched-request panic.
    let _store = connect_against(&server).await;
}

#[tokio::test]
async fn key_for_is_namespaced_by_batch_and_carries_the_filename() {
    let server = MockServer::start().await;
    let store = connect_against(&server).await;

    let key = store.key_for("batch-7", "input.jsonl");
    assert!(key.starts_with("batches/batch-7/input.jsonl_"));
    let suffix = key.strip_prefix("batches/batch-7/input.jsonl_").unwrap();
    assert!(uuid::Uuid::parse_str(suffix).is_ok());
}

#[tokio::test]
async fn put_uploads_bytes_to_the_bucket_key_path() {
    let server = MockServer::start().await;
    let store = connect_against(&server).await;

    Mock::given(method("PUT"))
        .and(path(format!("/{BUCKET}/batches/b1/file_abc")))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let result = store.put("batches/b1/file_abc", Bytes::from_static(b"line one\nline two\n")).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn get_returns_the_raw_blob_bytes() {
    let server = MockServer::start().await;
    let store = connect_against(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/{BUCKET}/batches/b1/file_abc")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(&b"{\"custom_id\":\"x\"}\n"[..]))
        .mount(&server)
        .await;

    let bytes = store.get("batches/b1/file_abc").await.unwrap();
    assert_eq!(&bytes[..], &b"{\"custom_id\":\"x\"}\n"[..]);
}

#[tokio::test]
async fn get_maps_a_missing_key_to_not_found() {
    let server = MockServer::start().await;
    let store = connect_against(&server).await;

    let error_body = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>NoSuchKey</Code>
  <Message>The specified key does not exist.</Message>
  <Key>batches/b1/missing</Key>
  <RequestId>test-request-id</RequestId>
</Error>"#;

    Mock::given(method("GET"))
        .and(path(format!("/{BUCKET}/batches/b1/missing")))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_raw(error_body, "application/xml"),
        )
        .mount(&server)
        .await;

    let result = store.get("batches/b1/missing").await;
    assert!(matches!(result, Err(ObjectStoreError::NotFound(key)) if key == "batches/b1/missing"));
}

#[tokio::test]
async fn delete_succeeds_on_a_204_response() {
    let server = MockServer::start().await;
    let store = connect_against(&server).await;

    Mock::given(method("DELETE"))
        .and(path(format!("/{BUCKET}/batches/b1/file_abc")))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let result = store.delete("batches/b1/file_abc").await;
    assert!(result.is_ok());
}
