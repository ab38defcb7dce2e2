use std::collections::{BTreeMap, HashMap};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::errors::Error;

pub const EVENT_SOURCE: &str = "aws:kafka";
pub const TIMESTAMP_TYPE: &str = "CREATE_TIME";

/// Rendered in place of a record key the producer did not set
pub const ABSENT_KEY: &str = "undefined";

/// A record as handed over by the broker client
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct RawRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp_millis: Option<i64>,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
}

/// Records delivered together from a single topic-partition
#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct Batch {
    pub topic: String,
    pub partition: i32,
    pub records: Vec<RawRecord>,
}

/// A record in the shape the Lambda Kafka event carries
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransformedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
    pub timestamp_type: String,
    pub key: String,
    /// Base64 of the raw value
    pub value: String,
    /// Never populated, headers are not propagated
    pub headers: Vec<HashMap<String, Vec<i8>>>,
}

/// Records grouped under `"{topic}-{partition}"`
pub type RecordMap = BTreeMap<String, Vec<TransformedRecord>>;

/// Payload of one invocation
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchEnvelope {
    pub event_source_arn: String,
    pub event_source: String,
    pub records: RecordMap,
}

impl BatchEnvelope {
    pub fn new(event_source_arn: impl Into<String>, records: RecordMap) -> Self {
        Self {
            event_source_arn: event_source_arn.into(),
            event_source: EVENT_SOURCE.to_string(),
            records,
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

pub fn record_map_key(topic: &str, partition: i32) -> String {
    format!("{}-{}", topic, partition)
}

impl TryFrom<&RawRecord> for TransformedRecord {
    type Error = Error;

    fn try_from(raw: &RawRecord) -> Result<Self, Self::Error> {
        let timestamp = raw.timestamp_millis.ok_or_else(|| Error::MissingTimestamp {
            topic: raw.topic.clone(),
            partition: raw.partition,
            offset: raw.offset,
        })?;

        let key = raw
            .key
            .as_deref()
            .map(|key| String::from_utf8_lossy(key).into_owned())
            .unwrap_or(ABSENT_KEY.to_string());

        let value = raw
            .value
            .as_deref()
            .map(|value| STANDARD.encode(value))
            .unwrap_or_default();

        Ok(Self {
            topic: raw.topic.clone(),
            partition: raw.partition,
            offset: raw.offset,
            timestamp,
            timestamp_type: TIMESTAMP_TYPE.to_string(),
            key,
            value,
            headers: Vec::new(),
        })
    }
}

/// Transforms `raw` and appends it under its topic-partition key.
pub fn append(records: &mut RecordMap, raw: &RawRecord) -> Result<(), Error> {
    let record = TransformedRecord::try_from(raw)?;
    records
        .entry(record_map_key(&raw.topic, raw.partition))
        .or_default()
        .push(record);
    Ok(())
}

/// Transforms a whole batch, preserving arrival order. The first record
/// that cannot be transformed aborts the batch.
pub fn transform(batch: &Batch) -> Result<RecordMap, Error> {
    let mut records = RecordMap::new();
    for raw in &batch.records {
        append(&mut records, raw)?;
    }
    Ok(records)
}
