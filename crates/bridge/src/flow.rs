//! Per-batch sequencing of transformation, offset resolution, liveness and dispatch.
//!
//! In [`AckMode::AtMostOnce`] every offset of a batch is resolved before
//! the batch is handed to the dispatcher, so a crash between the two loses
//! the batch. [`AckMode::AtLeastOnce`] resolves only after the invocation
//! was accepted and rewinds the partition to the start of the batch when
//! it was not, so no later offset is stored past a failed batch.

use crate::{
    broker::BrokerConsumer,
    config::AckMode,
    dispatch::{DispatchOutcome, Dispatcher},
    errors::Error,
    records::{append, Batch, BatchEnvelope, RecordMap},
};

/// Where a batch goes once transformed
#[derive(Clone, Copy, Debug)]
pub struct BatchTarget<'a> {
    pub function: &'a str,
    pub source_arn: &'a str,
    pub ack_mode: AckMode,
}

/// Processes one batch in arrival order and dispatches it once.
///
/// A record that cannot be transformed aborts the batch before dispatch;
/// offsets resolved for earlier records stay resolved.
pub async fn drive_batch(
    consumer: &mut dyn BrokerConsumer,
    batch: &Batch,
    dispatcher: &Dispatcher,
    target: BatchTarget<'_>,
) -> Result<(), Error> {
    if batch.records.is_empty() {
        tracing::debug!(topic = %batch.topic, partition = batch.partition, "Empty batch");
        return Ok(());
    }

    let mut records = RecordMap::new();

    match target.ack_mode {
        AckMode::AtMostOnce => {
            for raw in &batch.records {
                append(&mut records, raw)?;
                consumer
                    .resolve_offset(&raw.topic, raw.partition, raw.offset)
                    .await?;
                consumer.heartbeat().await?;
            }

            dispatcher.submit(
                target.function.to_string(),
                BatchEnvelope::new(target.source_arn, records),
            );
        }
        AckMode::AtLeastOnce => {
            for raw in &batch.records {
                append(&mut records, raw)?;
                consumer.heartbeat().await?;
            }

            let envelope = BatchEnvelope::new(target.source_arn, records);
            match dispatcher.dispatch(target.function, &envelope).await {
                DispatchOutcome::Accepted => {
                    for raw in &batch.records {
                        consumer
                            .resolve_offset(&raw.topic, raw.partition, raw.offset)
                            .await?;
                    }
                }
                DispatchOutcome::Failed => {
                    let first = batch.records[0].offset;
                    tracing::warn!(
                        function = %target.function,
                        topic = %batch.topic,
                        partition = batch.partition,
                        offset = first,
                        "Invocation failed, rewinding partition to redeliver the batch"
                    );
                    consumer.seek(&batch.topic, batch.partition, first).await?;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{batch, BrokerCall, MockBroker, MockInvoker, Script};

    fn target(ack_mode: AckMode) -> BatchTarget<'static> {
        BatchTarget {
            function: "svc-dev-orders",
            source_arn: "arn:*",
            ack_mode,
        }
    }

    #[tokio::test]
    async fn resolves_and_heartbeats_once_per_record_in_order() {
        let mut broker = MockBroker::new(Script::default());
        let log = broker.log();
        let invoker = Arc::new(MockInvoker::default());
        let dispatcher = Dispatcher::new(invoker.clone());

        drive_batch(
            &mut broker,
            &batch("orders", 0, &[10, 11, 12]),
            &dispatcher,
            target(AckMode::AtMostOnce),
        )
        .await
        .unwrap();
        dispatcher.drain().await;

        assert_eq!(
            log.calls(),
            vec![
                BrokerCall::ResolveOffset { partition: 0, offset: 10 },
                BrokerCall::Heartbeat,
                BrokerCall::ResolveOffset { partition: 0, offset: 11 },
                BrokerCall::Heartbeat,
                BrokerCall::ResolveOffset { partition: 0, offset: 12 },
                BrokerCall::Heartbeat,
            ]
        );
    }

    #[tokio::test]
    async fn dispatches_once_per_batch_with_every_record() {
        let mut broker = MockBroker::new(Script::default());
        let invoker = Arc::new(MockInvoker::default());
        let dispatcher = Dispatcher::new(invoker.clone());

        drive_batch(
            &mut broker,
            &batch("orders", 0, &[10, 11, 12]),
            &dispatcher,
            target(AckMode::AtMostOnce),
        )
        .await
        .unwrap();
        dispatcher.drain().await;

        let requests = invoker.requests();
        assert_eq!(requests.len(), 1);
        let envelope: BatchEnvelope = serde_json::from_slice(&requests[0].payload).unwrap();
        let offsets: Vec<i64> = envelope.records["orders-0"]
            .iter()
            .map(|r| r.offset)
            .collect();
        assert_eq!(offsets, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn failed_dispatch_does_not_fail_the_batch() {
        let mut broker = MockBroker::new(Script::default());
        let log = broker.log();
        let dispatcher = Dispatcher::new(Arc::new(MockInvoker::failing()));

        let result = drive_batch(
            &mut broker,
            &batch("orders", 0, &[1, 2]),
            &dispatcher,
            target(AckMode::AtMostOnce),
        )
        .await;
        dispatcher.drain().await;

        assert!(result.is_ok());
        assert_eq!(log.resolved_offsets(), vec![1, 2]);
    }

    #[tokio::test]
    async fn untransformable_record_aborts_before_dispatch() {
        let mut broker = MockBroker::new(Script::default());
        let log = broker.log();
        let invoker = Arc::new(MockInvoker::default());
        let dispatcher = Dispatcher::new(invoker.clone());
        let mut broken = batch("orders", 0, &[1, 2, 3]);
        broken.records[1].timestamp_millis = None;

        let err = drive_batch(&mut broker, &broken, &dispatcher, target(AckMode::AtMostOnce))
            .await
            .unwrap_err();
        dispatcher.drain().await;

        assert!(matches!(err, Error::MissingTimestamp { offset: 2, .. }));
        assert_eq!(log.resolved_offsets(), vec![1]);
        assert!(invoker.requests().is_empty());
    }

    #[tokio::test]
    async fn at_least_once_resolves_after_accepted_dispatch() {
        let mut broker = MockBroker::new(Script::default());
        let log = broker.log();
        let dispatcher = Dispatcher::new(Arc::new(MockInvoker::default()));

        drive_batch(
            &mut broker,
            &batch("orders", 0, &[5, 6]),
            &dispatcher,
            target(AckMode::AtLeastOnce),
        )
        .await
        .unwrap();

        assert_eq!(
            log.calls(),
            vec![
                BrokerCall::Heartbeat,
                BrokerCall::Heartbeat,
                BrokerCall::ResolveOffset { partition: 0, offset: 5 },
                BrokerCall::ResolveOffset { partition: 0, offset: 6 },
            ]
        );
    }

    #[tokio::test]
    async fn at_least_once_leaves_offsets_after_failed_dispatch() {
        let mut broker = MockBroker::new(Script::default());
        let log = broker.log();
        let dispatcher = Dispatcher::new(Arc::new(MockInvoker::failing()));

        drive_batch(
            &mut broker,
            &batch("orders", 0, &[5, 6]),
            &dispatcher,
            target(AckMode::AtLeastOnce),
        )
        .await
        .unwrap();

        assert!(log.resolved_offsets().is_empty());
        assert_eq!(
            log.calls().last(),
            Some(&BrokerCall::Seek { partition: 0, offset: 5 })
        );
    }

    #[tokio::test]
    async fn at_least_once_redelivers_a_failed_batch_before_later_offsets() {
        let mut broker = MockBroker::new(Script {
            batches: vec![batch("orders", 0, &[5, 6]), batch("orders", 0, &[7])],
            ..Default::default()
        });
        let log = broker.log();
        let invoker = Arc::new(MockInvoker::failing_first(1));
        let dispatcher = Dispatcher::new(invoker.clone());

        while let Some(next) = broker.next_batch().await.unwrap() {
            drive_batch(&mut broker, &next, &dispatcher, target(AckMode::AtLeastOnce))
                .await
                .unwrap();
        }

        assert_eq!(log.resolved_offsets(), vec![5, 6, 7]);
        let requests = invoker.requests();
        assert_eq!(requests.len(), 2);
        let redelivered: BatchEnvelope = serde_json::from_slice(&requests[1].payload).unwrap();
        let offsets: Vec<i64> = redelivered.records["orders-0"]
            .iter()
            .map(|r| r.offset)
            .collect();
        assert_eq!(offsets, vec![5, 6, 7]);
    }
}
