use std::{env, str::FromStr};

use crate::errors::Error;

pub const DEFAULT_LAMBDA_PORT: u16 = 3002;
pub const DEFAULT_LAMBDA_HOST: &str = "localhost";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_CLIENT_ID: &str = "offline-msk-client";

/// Broker connection settings shared read-only by every consumer session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub brokers: Vec<String>,
    pub client_id: String,
    pub allow_auto_topic_creation: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            allow_auto_topic_creation: true,
        }
    }
}

/// Where the local invocation endpoint listens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvokerConfig {
    pub host: String,
    pub port: u16,
    pub region: String,
}

impl InvokerConfig {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LAMBDA_HOST.to_string(),
            port: DEFAULT_LAMBDA_PORT,
            region: DEFAULT_REGION.to_string(),
        }
    }
}

/// When offsets are resolved relative to the invocation of their batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AckMode {
    /// Resolve every offset while the batch is transformed, then dispatch
    /// without waiting. A crash after resolution loses the batch.
    #[default]
    AtMostOnce,
    /// Dispatch and wait for the invocation to be accepted, then resolve.
    AtLeastOnce,
}

impl FromStr for AckMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "at-most-once" => Ok(Self::AtMostOnce),
            "at-least-once" => Ok(Self::AtLeastOnce),
            other => Err(Error::Config {
                message: format!("unknown ack mode '{}'", other),
            }),
        }
    }
}

/// What enumeration does when a function's `events` is not a sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MalformedEventsPolicy {
    /// Stop enumerating: the offending function and every later one are skipped.
    #[default]
    Stop,
    /// Skip only the offending function.
    SkipFunction,
}

impl FromStr for MalformedEventsPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stop" => Ok(Self::Stop),
            "skip-function" => Ok(Self::SkipFunction),
            other => Err(Error::Config {
                message: format!("unknown malformed events policy '{}'", other),
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub client: ClientConfig,
    pub invoker: InvokerConfig,
    pub ack_mode: AckMode,
    pub malformed_events: MalformedEventsPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let brokers = lookup("OFFLINE_MSK_BROKERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|broker| !broker.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let client = ClientConfig {
            brokers,
            client_id: lookup("OFFLINE_MSK_CLIENT_ID").unwrap_or(DEFAULT_CLIENT_ID.to_string()),
            allow_auto_topic_creation: parse_or(
                &lookup,
                "OFFLINE_MSK_ALLOW_AUTO_TOPIC_CREATION",
                true,
            )?,
        };

        let invoker = InvokerConfig {
            host: lookup("OFFLINE_MSK_LAMBDA_HOST").unwrap_or(DEFAULT_LAMBDA_HOST.to_string()),
            port: parse_or(&lookup, "OFFLINE_MSK_LAMBDA_PORT", DEFAULT_LAMBDA_PORT)?,
            region: lookup("OFFLINE_MSK_REGION").unwrap_or(DEFAULT_REGION.to_string()),
        };

        Ok(Self {
            client,
            invoker,
            ack_mode: parse_or(&lookup, "OFFLINE_MSK_ACK_MODE", AckMode::default())?,
            malformed_events: parse_or(
                &lookup,
                "OFFLINE_MSK_MALFORMED_EVENTS",
                MalformedEventsPolicy::default(),
            )?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, Error>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| Error::Config {
            message: format!("{}: {}", key, e),
        }),
    }
}
