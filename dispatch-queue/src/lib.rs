mod ack;
pub mod client;
pub mod config;
pub mod error;
mod messages;

pub use ack::{AckHandle, AckMsg};
pub use client::Broker;
pub use config::{BATCH_JOBS_QUEUE, BrokerConfig, TASKS_QUEUE};
pub use error::QueueError;
pub use messages::{BatchJobMessage, TaskMessage};
