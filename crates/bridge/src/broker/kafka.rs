use std::{collections::VecDeque, future::Future, time::Duration};

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig as KafkaClientConfig,
    consumer::{BaseConsumer, CommitMode, Consumer, StreamConsumer},
    message::{BorrowedMessage, Message},
    Offset,
};
use tokio::time::Instant;

use crate::{
    errors::Error,
    records::{Batch, RawRecord},
};

use super::{BrokerConsumer, ConsumerFactory, ConsumerOptions};

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default)]
pub struct KafkaConsumerFactory;

impl ConsumerFactory for KafkaConsumerFactory {
    fn create(&self, options: ConsumerOptions) -> Result<Box<dyn BrokerConsumer>, Error> {
        Ok(Box::new(KafkaConsumer::new(options)))
    }
}

pub struct KafkaConsumer {
    options: ConsumerOptions,
    connected: bool,
    consumer: Option<StreamConsumer>,
    pending: VecDeque<Batch>,
}

impl KafkaConsumer {
    pub fn new(options: ConsumerOptions) -> Self {
        Self {
            options,
            connected: false,
            consumer: None,
            pending: VecDeque::new(),
        }
    }

    fn client_config(&self) -> KafkaClientConfig {
        let mut config = KafkaClientConfig::new();
        config
            .set("bootstrap.servers", self.options.client.brokers.join(","))
            .set("client.id", &self.options.client.client_id)
            .set("group.id", &self.options.group_id)
            .set(
                "allow.auto.create.topics",
                self.options.client.allow_auto_topic_creation.to_string(),
            )
            .set(
                "max.in.flight.requests.per.connection",
                self.options.max_in_flight_requests.max(1).to_string(),
            )
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false");
        config
    }

    fn consumer(&self) -> Result<&StreamConsumer, Error> {
        self.consumer.as_ref().ok_or_else(|| Error::Broker {
            message: format!("consumer {} is not subscribed", self.options.group_id),
        })
    }
}

#[async_trait]
impl BrokerConsumer for KafkaConsumer {
    /// Probes cluster metadata on a short-lived client. The group member
    /// itself is created on `subscribe`, once the reset policy is known.
    async fn connect(&mut self) -> Result<(), Error> {
        let metadata_client: BaseConsumer = self.client_config().create()?;

        let brokers = tokio::task::spawn_blocking(move || {
            metadata_client
                .fetch_metadata(None, METADATA_TIMEOUT)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .map_err(|e| Error::Broker {
            message: e.to_string(),
        })??;

        tracing::debug!(group_id = %self.options.group_id, brokers, "Connected");
        self.connected = true;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, from_beginning: bool) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::Broker {
                message: format!("consumer {} is not connected", self.options.group_id),
            });
        }

        let mut config = self.client_config();
        config.set(
            "auto.offset.reset",
            if from_beginning { "earliest" } else { "latest" },
        );

        let consumer: StreamConsumer = config.create()?;
        consumer.subscribe(&[topic])?;
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>, Error> {
        if let Some(batch) = self.pending.pop_front() {
            return Ok(Some(batch));
        }

        let max_batch_size = self.options.max_batch_size.max(1);
        let window = self.options.max_batching_window;
        let consumer = self.consumer()?;

        let received = fill_batch(max_batch_size, window, move || async move {
            consumer
                .recv()
                .await
                .map(|message| raw_record(&message))
                .map_err(Error::from)
        })
        .await?;

        self.pending.extend(split_by_partition(received));
        Ok(self.pending.pop_front())
    }

    async fn resolve_offset(
        &mut self,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<(), Error> {
        self.consumer()?.store_offset(topic, partition, offset + 1)?;
        Ok(())
    }

    /// Batches already split off for the partition are dropped, they are
    /// fetched again from the new position.
    async fn seek(&mut self, topic: &str, partition: i32, offset: i64) -> Result<(), Error> {
        self.pending
            .retain(|batch| batch.topic != topic || batch.partition != partition);
        self.consumer()?
            .seek(topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)?;
        Ok(())
    }

    /// librdkafka heartbeats the group from its own thread.
    async fn heartbeat(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.pending.clear();
        self.connected = false;

        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.commit_consumer_state(CommitMode::Sync) {
                tracing::debug!(group_id = %self.options.group_id, "Nothing committed on disconnect: {}", e);
            }
            consumer.unsubscribe();
        }
        Ok(())
    }
}

fn raw_record(message: &BorrowedMessage<'_>) -> RawRecord {
    RawRecord::new(
        message.topic().to_string(),
        message.partition(),
        message.offset(),
        message.timestamp().to_millis(),
        message.key().map(<[u8]>::to_vec),
        message.payload().map(<[u8]>::to_vec),
    )
}

/// Waits for a first record, then keeps receiving until the batch is full
/// or `window` has elapsed. A receive error after the first record closes
/// the batch early; the records already taken off the stream are kept.
async fn fill_batch<F, Fut>(
    max_batch_size: usize,
    window: Duration,
    mut recv: F,
) -> Result<Vec<RawRecord>, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RawRecord, Error>>,
{
    let mut received = vec![recv().await?];
    let deadline = Instant::now() + window;

    while received.len() < max_batch_size {
        match tokio::time::timeout_at(deadline, recv()).await {
            Ok(Ok(record)) => received.push(record),
            Ok(Err(e)) => {
                tracing::warn!(
                    received = received.len(),
                    "Receive failed, closing batch early: {}",
                    e
                );
                break;
            }
            Err(_) => break,
        }
    }

    Ok(received)
}

/// Groups records into one batch per topic-partition, in order of first
/// appearance, keeping arrival order inside each batch.
fn split_by_partition(records: Vec<RawRecord>) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();

    for record in records {
        match batches
            .iter_mut()
            .find(|b| b.topic == record.topic && b.partition == record.partition)
        {
            Some(batch) => batch.records.push(record),
            None => batches.push(Batch::new(
                record.topic.clone(),
                record.partition,
                vec![record],
            )),
        }
    }

    batches
}
