use std::time::Duration;

use chrono::Utc;
use dispatch_objectstore::ObjectStore;
use dispatch_queue::{Broker, BatchJobMessage, TaskMessage};
use dispatch_retry::{RetryPolicy, retry};
use dispatch_store::EventStore;
use dispatch_types::Event;
use log::{info, warn};
use serde_json::json;

use crate::config::IngestConfig;
use crate::error::IngestFatalError;
use crate::ingest::parse::parse_jsonl_chunks;

fn index_publish_policy(config: &IngestConfig) -> RetryPolicy {
    RetryPolicy::new(
        config.index_publish_retries,
        2.0,
        Duration::from_secs(1),
        Duration::from_secs(10),
    )
}

/// Ingests one `batch_jobs` message end to end: fetch, parse, index,
/// publish, delete. Any failure propagates so the caller leaves the
/// delivery unacked for redelivery, per §4.4 step 5.
pub async fn ingest_batch_message(
    message: &BatchJobMessage,
    store: &EventStore,
    broker: &Broker,
    object_store: &ObjectStore,
    config: &IngestConfig,
) -> Result<(), IngestFatalError> {
    info!(
        "ingesting batch {} from {}/{}",
        message.batch_id, message.bucket_name, message.object_name
    );

    let blob = object_store.get(&message.object_name).await?;
    let (chunks, skipped) = parse_jsonl_chunks(&blob, config.chunk_size);
    let total_valid: usize = chunks.iter().map(Vec::len).sum();
    info!(
        "batch {} has {total_valid} valid task(s) across {} chunk(s), {skipped} line(s) skipped",
        message.batch_id,
        chunks.len()
    );

    let policy = index_publish_policy(config);

    for (chunk_index, chunk) in chunks.into_iter().enumerate() {
        let created_at = Utc::now();
        let events: Vec<Event> = chunk
            .iter()
            .map(|line| {
                Event::new_pending(
                    uuid::Uuid::new_v4().to_string(),
                    Some(message.batch_id.clone()),
                    line.custom_id.clone(),
                    line.method.clone(),
                    line.url.clone(),
                    line.body.clone(),
                    line.dataset.clone(),
                    line.source.clone(),
                    created_at,
                )
            })
            .collect();

        retry(policy, "bulk index pending events", |_attempt| {
            store.create_pending_bulk(&events)
        })
        .await?;
        info!(
            "batch {} chunk {chunk_index}: indexed {} event(s)",
            message.batch_id,
            events.len()
        );

        for (event, line) in events.iter().zip(chunk.iter()) {
            let task_message = TaskMessage {
                message_id: event.message_id.clone(),
                batch_id: event.batch_id.clone(),
                timestamp: Utc::now(),
                payload: json!({ "api_key": line.api_key }),
            };
            retry(policy, "publish task message", |_attempt| {
                broker.publish_task(&task_message)
            })
            .await?;
        }
        info!(
            "batch {} chunk {chunk_index}: published {} task message(s)",
            message.batch_id,
            events.len()
        );
    }

    object_store.delete(&message.object_name).await?;
    info!("batch {} ingested, blob {} deleted", message.batch_id, message.object_name);

    if skipped > 0 {
        warn!("batch {} skipped {skipped} invalid line(s)", message.batch_id);
    }

    Ok(())
}
