use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid service definition: {message}")]
    ServiceDefinition { message: String },

    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("Broker error: {message}")]
    Broker { message: String },

    #[error("Record {topic}-{partition}@{offset} has no usable timestamp")]
    MissingTimestamp {
        topic: String,
        partition: i32,
        offset: i64,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invocation of {function} failed: {message}")]
    Invocation { function: String, message: String },
}
