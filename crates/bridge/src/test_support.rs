//! Scripted broker and invoker doubles shared by the unit tests

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    broker::{BrokerConsumer, ConsumerFactory, ConsumerOptions},
    dispatch::{InvocationRequest, Invoker},
    errors::Error,
    records::{Batch, RawRecord},
};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BrokerCall {
    Connect,
    Subscribe { topic: String, from_beginning: bool },
    ResolveOffset { partition: i32, offset: i64 },
    Seek { partition: i32, offset: i64 },
    Heartbeat,
    Disconnect,
}

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<BrokerCall>>>);

impl CallLog {
    fn push(&self, call: BrokerCall) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.0.lock().unwrap().clone()
    }

    pub fn resolved_offsets(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrokerCall::ResolveOffset { offset, .. } => Some(offset),
                _ => None,
            })
            .collect()
    }
}

/// What a mock consumer does once created
#[derive(Clone, Debug, Default)]
pub struct Script {
    pub batches: Vec<Batch>,
    pub fail_connect: bool,
    pub fail_subscribe: bool,
    /// Keep waiting for batches after the scripted ones instead of ending
    pub hold_open: bool,
}

pub struct MockBroker {
    log: CallLog,
    batches: VecDeque<Batch>,
    delivered: Vec<RawRecord>,
    script: Script,
}

impl MockBroker {
    pub fn new(script: Script) -> Self {
        Self {
            log: CallLog::default(),
            batches: script.batches.clone().into(),
            delivered: Vec::new(),
            script,
        }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }
}

#[async_trait]
impl BrokerConsumer for MockBroker {
    async fn connect(&mut self) -> Result<(), Error> {
        self.log.push(BrokerCall::Connect);
        if self.script.fail_connect {
            return Err(Error::Broker {
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, from_beginning: bool) -> Result<(), Error> {
        self.log.push(BrokerCall::Subscribe {
            topic: topic.to_string(),
            from_beginning,
        });
        if self.script.fail_subscribe {
            return Err(Error::Broker {
                message: format!("unknown topic {}", topic),
            });
        }
        Ok(())
    }

    async fn next_batch(&mut self) -> Result<Option<Batch>, Error> {
        match self.batches.pop_front() {
            Some(batch) => {
                self.delivered.extend(batch.records.iter().cloned());
                Ok(Some(batch))
            }
            None if self.script.hold_open => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn resolve_offset(
        &mut self,
        _topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<(), Error> {
        self.log.push(BrokerCall::ResolveOffset { partition, offset });
        Ok(())
    }

    /// Queues every known record of the partition from `offset` on as the
    /// next batch, the way a fetch from the rewound position would.
    async fn seek(&mut self, topic: &str, partition: i32, offset: i64) -> Result<(), Error> {
        self.log.push(BrokerCall::Seek { partition, offset });

        let mut records: Vec<RawRecord> = self
            .delivered
            .iter()
            .chain(self.batches.iter().flat_map(|b| b.records.iter()))
            .filter(|r| r.topic == topic && r.partition == partition && r.offset >= offset)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.offset);
        records.dedup_by_key(|r| r.offset);

        self.batches
            .retain(|b| b.topic != topic || b.partition != partition);
        if !records.is_empty() {
            self.batches
                .push_front(Batch::new(topic.to_string(), partition, records));
        }
        Ok(())
    }

    async fn heartbeat(&mut self) -> Result<(), Error> {
        self.log.push(BrokerCall::Heartbeat);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Error> {
        self.log.push(BrokerCall::Disconnect);
        Ok(())
    }
}

/// Hands out one scripted `MockBroker` per consumer group
#[derive(Default)]
pub struct MockFactory {
    scripts: Mutex<HashMap<String, Script>>,
    logs: Mutex<HashMap<String, CallLog>>,
    created: Mutex<Vec<ConsumerOptions>>,
}

impl MockFactory {
    pub fn with_group(self, group_id: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(group_id.to_string(), script);
        self
    }

    pub fn calls(&self, group_id: &str) -> Vec<BrokerCall> {
        self.logs
            .lock()
            .unwrap()
            .get(group_id)
            .map(CallLog::calls)
            .unwrap_or_default()
    }

    pub fn created(&self) -> Vec<ConsumerOptions> {
        self.created.lock().unwrap().clone()
    }
}

impl ConsumerFactory for MockFactory {
    fn create(&self, options: ConsumerOptions) -> Result<Box<dyn BrokerConsumer>, Error> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(&options.group_id)
            .unwrap_or_default();
        let broker = MockBroker::new(script);

        self.logs
            .lock()
            .unwrap()
            .insert(options.group_id.clone(), broker.log());
        self.created.lock().unwrap().push(options);
        Ok(Box::new(broker))
    }
}

#[derive(Default)]
pub struct MockInvoker {
    failures_left: Mutex<usize>,
    requests: Mutex<Vec<InvocationRequest>>,
}

impl MockInvoker {
    pub fn failing() -> Self {
        Self::failing_first(usize::MAX)
    }

    /// Fails the first `count` invocations, accepts the rest
    pub fn failing_first(count: usize) -> Self {
        Self {
            failures_left: Mutex::new(count),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<InvocationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Invoker for MockInvoker {
    async fn invoke(&self, request: InvocationRequest) -> Result<(), Error> {
        let function = request.target_name.clone();
        self.requests.lock().unwrap().push(request);

        let mut failures_left = self.failures_left.lock().unwrap();
        if *failures_left > 0 {
            *failures_left -= 1;
            return Err(Error::Invocation {
                function,
                message: "connection reset by peer".to_string(),
            });
        }
        Ok(())
    }
}

pub fn batch(topic: &str, partition: i32, offsets: &[i64]) -> Batch {
    Batch::new(
        topic.to_string(),
        partition,
        offsets
            .iter()
            .map(|offset| {
                RawRecord::new(
                    topic.to_string(),
                    partition,
                    *offset,
                    Some(1_700_000_000_000),
                    Some(format!("key-{}", offset).into_bytes()),
                    Some(format!("value-{}", offset).into_bytes()),
                )
            })
            .collect(),
    )
}

/// Yields to other tasks until `condition` holds, failing after five seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition not reached in time");
}
