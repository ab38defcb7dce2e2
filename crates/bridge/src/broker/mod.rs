use std::time::Duration;

use async_trait::async_trait;

use crate::{config::ClientConfig, errors::Error, records::Batch};

/// rdkafka backed consumer
pub mod kafka;

pub use kafka::{KafkaConsumer, KafkaConsumerFactory};

/// Settings for one consumer group member
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConsumerOptions {
    pub client: ClientConfig,
    pub group_id: String,
    /// Upper bound of records in one batch
    pub max_batch_size: usize,
    /// Upper bound of unacknowledged requests per broker connection
    pub max_in_flight_requests: usize,
    /// How long to keep filling a batch once its first record arrived
    pub max_batching_window: Duration,
}

/// A consumer group member driven by a session.
///
/// A session calls `connect`, then `subscribe`, then loops on `next_batch`;
/// for every record it calls `resolve_offset` and `heartbeat` in order.
#[async_trait]
pub trait BrokerConsumer: Send {
    async fn connect(&mut self) -> Result<(), Error>;

    async fn subscribe(&mut self, topic: &str, from_beginning: bool) -> Result<(), Error>;

    /// Waits for the next batch. `None` once the consumer can deliver nothing more.
    async fn next_batch(&mut self) -> Result<Option<Batch>, Error>;

    /// Marks `offset` processed so the committed position can move past it.
    async fn resolve_offset(&mut self, topic: &str, partition: i32, offset: i64)
        -> Result<(), Error>;

    /// Moves the fetch position of a partition back to `offset` so the
    /// records from there on are delivered again.
    async fn seek(&mut self, topic: &str, partition: i32, offset: i64) -> Result<(), Error>;

    async fn heartbeat(&mut self) -> Result<(), Error>;

    async fn disconnect(&mut self) -> Result<(), Error>;
}

pub trait ConsumerFactory: Send + Sync {
    fn create(&self, options: ConsumerOptions) -> Result<Box<dyn BrokerConsumer>, Error>;
}
