//! Integration tests against a real RabbitMQ broker. These document the
//! publish-confirm and manual-ack contract of §4.3/§4.5 end to end, but
//! are `#[ignore]`d: they compile in every run and only execute against a
//! broker on `localhost:5672` (or `BROKER_HOST`/`BROKER_PORT`) when
//! explicitly requested with `cargo test -- --ignored`.

use chrono::Utc;
use dispatch_queue::{BatchJobMessage, Broker, BrokerConfig, TaskMessage};
use serde_json::json;

async fn connect() -> Broker {
    let config = BrokerConfig::from_environment().unwrap_or(BrokerConfig {
        host: "localhost".to_string(),
        port: 5672,
        user: "guest".to_string(),
        pass: "guest".to_string(),
    });
    Broker::connect(&config).await.expect("failed to connect to broker")
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn connect_declares_both_durable_queues() {
    let broker = connect().await;
    assert!(broker.is_connected());
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn publish_batch_job_confirms_before_returning() {
    let broker = connect().await;
    let message = BatchJobMessage {
        batch_id: "test-batch".to_string(),
        object_name: "batches/test-batch/input.jsonl_abc".to_string(),
        bucket_name: "batches".to_string(),
        upload_timestamp: Utc::now(),
    };

    broker.publish_batch_job(&message).await.expect("publish should be confirmed");
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn publish_task_confirms_before_returning() {
    let broker = connect().await;
    let message = TaskMessage {
        message_id: "test-message".to_string(),
        batch_id: Some("test-batch".to_string()),
        timestamp: Utc::now(),
        payload: json!({ "api_key": null }),
    };

    broker.publish_task(&message).await.expect("publish should be confirmed");
}

#[tokio::test]
#[ignore = "requires a running RabbitMQ broker"]
async fn consume_tasks_yields_a_prefetch_bounded_ack_handle() {
    let broker = connect().await;
    let (_consumer, ack_handle) = broker.consume_tasks(10).await.expect("consume should succeed");
    // Acking an unknown delivery tag is a broker-side no-op; this only
    // exercises that the ack marshalling channel is wired up.
    ack_handle.ack(1);
}
