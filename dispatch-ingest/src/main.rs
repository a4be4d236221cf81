mod config;
mod error;
mod ingest;

use std::sync::Arc;

use dispatch_objectstore::{ObjectStore, ObjectStoreConfig};
use dispatch_queue::{Broker, BrokerConfig};
use dispatch_store::{EventStore, StoreConfig};
use futures::StreamExt;
use log::{error, info, warn};
use miette::IntoDiagnostic;
use tokio::sync::Semaphore;

use crate::config::IngestConfig;
use crate::ingest::ingest_batch_message;

/// Concurrent batch-job deliveries processed at once within this
/// process. Ingestion replicas scale horizontally, so this is a modest
/// fixed bound rather than a tunable like the executor's worker pool.
const INGEST_CONCURRENCY: usize = 4;

#[tokio::main]
async fn main() -> miette::Result<()> {
    env_logger::init();

    let config = Arc::new(IngestConfig::config().into_diagnostic()?);
    info!(
        "starting ingestion worker: chunk_size={} index_publish_retries={}",
        config.chunk_size, config.index_publish_retries
    );

    let store_config = StoreConfig::from_environment().into_diagnostic()?;
    let store = Arc::new(EventStore::new(&store_config).into_diagnostic()?);
    store.ensure_index().await.into_diagnostic()?;

    let object_store_config = ObjectStoreConfig::from_environment().into_diagnostic()?;
    let object_store = Arc::new(ObjectStore::connect(&object_store_config).await.into_diagnostic()?);

    let broker_config = BrokerConfig::from_environment().into_diagnostic()?;
    let broker = Arc::new(Broker::connect(&broker_config).await.into_diagnostic()?);

    let (consumer, ack_handle) = broker
        .consume_batch_jobs(INGEST_CONCURRENCY as u16)
        .await
        .into_diagnostic()?;
    futures::pin_mut!(consumer);

    let semaphore = Arc::new(Semaphore::new(INGEST_CONCURRENCY));

    info!("ingestion worker ready, consuming batch_jobs");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                error!("error receiving batch_jobs delivery: {err}");
                continue;
            }
        };

        let permit = semaphore.clone().acquire_owned().await.into_diagnostic()?;
        let store = store.clone();
        let broker = broker.clone();
        let object_store = object_store.clone();
        let config = config.clone();
        let ack_handle = ack_handle.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let delivery_tag = delivery.delivery_tag;

            let message = match serde_json::from_slice::<dispatch_queue::BatchJobMessage>(&delivery.data) {
                Ok(message) => message,
                Err(err) => {
                    error!("malformed batch_jobs message, dropping: {err}");
                    ack_handle.ack(delivery_tag);
                    return;
                }
            };

            match ingest_batch_message(&message, &store, &broker, &object_store, &config).await {
                Ok(()) => ack_handle.ack(delivery_tag),
                Err(err) => {
                    warn!("ingesting batch {} failed, will be redelivered: {err}", message.batch_id);
                    ack_handle.nack(delivery_tag, true);
                }
            }
        });
    }

    Ok(())
}
