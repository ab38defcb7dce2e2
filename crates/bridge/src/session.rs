use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    broker::{ConsumerFactory, ConsumerOptions},
    config::{AckMode, ClientConfig},
    dispatch::Dispatcher,
    errors::Error,
    events::StreamingBinding,
    flow::{drive_batch, BatchTarget},
};

/// Everything a session shares with the others
#[derive(Clone)]
pub struct SessionContext {
    pub client: ClientConfig,
    pub factory: Arc<dyn ConsumerFactory>,
    pub dispatcher: Dispatcher,
    pub ack_mode: AckMode,
    pub shutdown: CancellationToken,
}

/// Why a session returned
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionExit {
    /// The event is disabled, nothing was connected
    Disabled,
    /// Shutdown was requested
    Cancelled,
    /// The consumer has nothing more to deliver
    Closed,
}

/// Connects, subscribes and consumes batches for one streaming binding
/// until shutdown is requested or the consumer closes.
///
/// Connect and subscribe failures are returned. Failures while consuming
/// are logged and consumption goes on.
pub async fn run_session(
    binding: &StreamingBinding,
    context: &SessionContext,
) -> Result<SessionExit, Error> {
    let descriptor = &binding.descriptor;
    let function = binding.target_name();

    if !descriptor.enabled {
        tracing::info!(function, topic = %descriptor.topic, "Event disabled, no consumer started");
        return Ok(SessionExit::Disabled);
    }

    for issue in descriptor.issues() {
        tracing::warn!(function, topic = %descriptor.topic, "{}", issue);
    }

    // In-flight requests follow the batch size until they get their own setting
    let batch_size = descriptor.batch_size as usize;
    let options = ConsumerOptions {
        client: context.client.clone(),
        group_id: binding.group_id().to_string(),
        max_batch_size: batch_size,
        max_in_flight_requests: batch_size,
        max_batching_window: Duration::from_secs(descriptor.max_batching_window_seconds.into()),
    };

    let mut consumer = context.factory.create(options)?;
    consumer.connect().await?;
    consumer
        .subscribe(&descriptor.topic, descriptor.from_beginning())
        .await?;

    tracing::info!(
        function,
        topic = %descriptor.topic,
        group_id = binding.group_id(),
        starting_position = %descriptor.starting_position,
        "Consumer running"
    );

    let target = BatchTarget {
        function,
        source_arn: &descriptor.source_arn,
        ack_mode: context.ack_mode,
    };

    let exit = loop {
        let next = tokio::select! {
            biased;
            _ = context.shutdown.cancelled() => break SessionExit::Cancelled,
            next = consumer.next_batch() => next,
        };

        match next {
            Ok(Some(batch)) => {
                if let Err(e) =
                    drive_batch(consumer.as_mut(), &batch, &context.dispatcher, target).await
                {
                    tracing::error!(
                        function,
                        topic = %batch.topic,
                        partition = batch.partition,
                        "Batch aborted: {}",
                        e
                    );
                }
            }
            Ok(None) => break SessionExit::Closed,
            Err(e) => {
                tracing::warn!(function, topic = %descriptor.topic, "Receive failed: {}", e);
            }
        }
    };

    if let Err(e) = consumer.disconnect().await {
        tracing::warn!(function, topic = %descriptor.topic, "Disconnect failed: {}", e);
    }

    tracing::info!(function, topic = %descriptor.topic, ?exit, "Consumer stopped");
    Ok(exit)
}
