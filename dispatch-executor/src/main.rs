mod config;
mod error;
mod pipeline;

use std::sync::Arc;

use dispatch_queue::{Broker, BrokerConfig};
use dispatch_store::{EventStore, StoreConfig};
use dispatch_upstream::UpstreamClient;
use futures::StreamExt;
use log::{error, info, warn};
use miette::IntoDiagnostic;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::ExecutorConfig;
use crate::pipeline::process_task;

#[tokio::main]
async fn main() -> miette::Result<()> {
    env_logger::init();

    let config = Arc::new(ExecutorConfig::config().into_diagnostic()?);
    info!(
        "starting execution worker: max_parallel_tasks={} max_retries={} llm_timeout={}s",
        config.max_parallel_tasks, config.max_retries, config.llm_timeout_secs
    );

    let store_config = StoreConfig::from_environment().into_diagnostic()?;
    let store = Arc::new(EventStore::new(&store_config).into_diagnostic()?);
    store.ensure_index().await.into_diagnostic()?;

    let broker_config = BrokerConfig::from_environment().into_diagnostic()?;
    let broker = Broker::connect(&broker_config).await.into_diagnostic()?;

    let upstream = Arc::new(UpstreamClient::new(config.llm_timeout()));

    // Prefetch equals the pool size: fair dispatch and in-flight
    // accounting are delegated to the broker (§4.5).
    let (consumer, ack_handle) = broker
        .consume_tasks(config.max_parallel_tasks as u16)
        .await
        .into_diagnostic()?;
    futures::pin_mut!(consumer);

    // A Semaphore bounds concurrency; a JoinSet keeps a crashed task's
    // panic from silently dropping its permit, mirroring the
    // spawn+JoinError accounting the teacher's ingestion main loop does.
    let semaphore = Arc::new(Semaphore::new(config.max_parallel_tasks));
    let mut in_flight: JoinSet<()> = JoinSet::new();

    info!("execution worker ready, consuming tasks");

    loop {
        tokio::select! {
            delivery = consumer.next() => {
                let Some(delivery) = delivery else { break; };
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(err) => {
                        error!("error receiving tasks delivery: {err}");
                        continue;
                    }
                };

                let message = match serde_json::from_slice::<dispatch_queue::TaskMessage>(&delivery.data) {
                    Ok(message) => message,
                    Err(err) => {
                        error!("malformed tasks message, dropping: {err}");
                        ack_handle.ack(delivery.delivery_tag);
                        continue;
                    }
                };

                let permit = semaphore.clone().acquire_owned().await.into_diagnostic()?;
                let store = store.clone();
                let upstream = upstream.clone();
                let ack_handle = ack_handle.clone();
                let config = config.clone();
                let delivery_tag = delivery.delivery_tag;

                in_flight.spawn(async move {
                    let _permit = permit;
                    process_task(message, delivery_tag, &store, &upstream, &ack_handle, &config).await;
                });
            }
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(err) = result {
                    warn!("a task execution panicked: {err}");
                }
            }
        }
    }

    while let Some(result) = in_flight.join_next().await {
        if let Err(err) = result {
            warn!("a task execution panicked during shutdown drain: {err}");
        }
    }

    Ok(())
}
