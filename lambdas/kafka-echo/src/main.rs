use aws_lambda_events::event::kafka::{KafkaEvent, KafkaRecord};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde::Serialize;

#[derive(Clone, Debug, Default, Serialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
struct EchoResponse {
    records: usize,
    undecodable: usize,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    lambda_runtime::run(service_fn(|event: LambdaEvent<KafkaEvent>| async {
        handle(event).await
    }))
    .await
}

async fn handle(event: LambdaEvent<KafkaEvent>) -> Result<EchoResponse, Error> {
    Ok(summarize(&event.payload))
}

fn summarize(event: &KafkaEvent) -> EchoResponse {
    let mut response = EchoResponse::default();

    tracing::info!(
        "Processing {} Kafka partitions from {}",
        event.records.len(),
        event.event_source_arn.as_deref().unwrap_or("unknown source")
    );

    for (partition, records) in event.records.iter() {
        for record in records {
            response.records += 1;

            match decode_value(record) {
                Ok(value) => tracing::info!(
                    "{}@{} at {}: {}",
                    partition,
                    record.offset,
                    record.timestamp.0.to_rfc3339(),
                    value
                ),
                Err(e) => {
                    response.undecodable += 1;
                    tracing::error!("{}@{} has an undecodable value: {}", partition, record.offset, e);
                }
            }
        }
    }

    response
}

fn decode_value(record: &KafkaRecord) -> Result<String, Error> {
    let Some(value) = record.value.as_deref() else {
        return Ok(String::new());
    };
    let bytes = STANDARD.decode(value)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
