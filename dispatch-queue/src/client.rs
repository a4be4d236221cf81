use std::time::Duration;

use dispatch_retry::{RetryPolicy, retry};
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ConfirmSelectOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use log::{info, warn};
use tokio::sync::mpsc;

use crate::ack::{AckHandle, AckMsg, spawn_ack_owner};
use crate::config::{BATCH_JOBS_QUEUE, BrokerConfig, TASKS_QUEUE};
use crate::error::QueueError;
use crate::messages::{BatchJobMessage, TaskMessage};

const PUBLISH_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);
const RECONNECT_POLICY: RetryPolicy = RetryPolicy {
    max_attempts: u32::MAX,
    multiplier: 2.0,
    min_delay: Duration::from_secs(1),
    max_delay: Duration::from_secs(30),
};

/// Owns one AMQP connection and channel per process. Transparent
/// reconnect with bounded backoff; re-declares both durable queues on
/// every (re)connect.
pub struct Broker {
    connection: Connection,
    channel: Channel,
}

impl Broker {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, QueueError> {
        let (connection, channel) = retry(RECONNECT_POLICY, "connect to broker", |_attempt| {
            connect_once(config)
        })
        .await?;

        let broker = Self { connection, channel };
        broker.ensure_queues().await?;
        Ok(broker)
    }

    async fn ensure_queues(&self) -> Result<(), QueueError> {
        for queue in [BATCH_JOBS_QUEUE, TASKS_QUEUE] {
            self.channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(QueueError::Connect)?;
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    pub async fn publish_batch_job(&self, message: &BatchJobMessage) -> Result<(), QueueError> {
        let body = serde_json::to_vec(message).map_err(QueueError::Decode)?;
        self.publish(BATCH_JOBS_QUEUE, &body).await
    }

    pub async fn publish_task(&self, message: &TaskMessage) -> Result<(), QueueError> {
        let body = serde_json::to_vec(message).map_err(QueueError::Decode)?;
        self.publish(TASKS_QUEUE, &body).await
    }

    async fn publish(&self, queue: &str, body: &[u8]) -> Result<(), QueueError> {
        let confirm = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await
            .map_err(QueueError::Connect)?;

        let confirmation = tokio::time::timeout(PUBLISH_CONFIRM_TIMEOUT, confirm)
            .await
            .map_err(|_| QueueError::Unconfirmed)?
            .map_err(QueueError::Connect)?;

        if confirmation.is_nack() {
            return Err(QueueError::Nacked);
        }
        Ok(())
    }

    /// Sets channel prefetch to the worker-pool size and begins manual-ack
    /// consumption. Returns the delivery stream plus an [`AckHandle`] that
    /// worker tasks use to hand acks back to the connection-owning task
    /// rather than touching the channel themselves.
    pub async fn consume_tasks(&self, prefetch: u16) -> Result<(Consumer, AckHandle), QueueError> {
        self.consume(TASKS_QUEUE, prefetch).await
    }

    pub async fn consume_batch_jobs(&self, prefetch: u16) -> Result<(Consumer, AckHandle), QueueError> {
        self.consume(BATCH_JOBS_QUEUE, prefetch).await
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<(Consumer, AckHandle), QueueError> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await
            .map_err(QueueError::Connect)?;

        let consumer = self
            .channel
            .basic_consume(
                queue,
                &format!("{queue}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(QueueError::Consume)?;

        let (tx, rx) = mpsc::unbounded_channel::<AckMsg>();
        spawn_ack_owner(self.channel.clone(), rx);

        Ok((consumer, AckHandle::new(tx)))
    }
}

async fn connect_once(config: &BrokerConfig) -> Result<(Connection, Channel), QueueError> {
    info!("connecting to broker at {}:{}", config.host, config.port);
    let connection = Connection::connect(
        &config.amqp_url(),
        ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio),
    )
    .await
    .map_err(QueueError::Connect)?;

    let channel = connection.create_channel().await.map_err(QueueError::Connect)?;
    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(QueueError::Connect)?;

    Ok((connection, channel))
}
