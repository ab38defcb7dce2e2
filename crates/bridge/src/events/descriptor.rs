use std::fmt;

use serde::Deserialize;

pub const DEFAULT_SOURCE_ARN: &str = "arn:*";
pub const DEFAULT_BATCH_SIZE: u32 = 100;
pub const DEFAULT_MAX_BATCHING_WINDOW_SECONDS: u32 = 1;

/// Where a new consumer group starts reading a topic
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(from = "String")]
pub enum StartingPosition {
    Earliest,
    #[default]
    Latest,
    /// Lambda's name for reading from the oldest retained record
    TrimHorizon,
    Unrecognized(String),
}

impl From<String> for StartingPosition {
    fn from(value: String) -> Self {
        match value.as_str() {
            "LATEST" => Self::Latest,
            "EARLIEST" => Self::Earliest,
            "TRIM_HORIZON" => Self::TrimHorizon,
            _ => Self::Unrecognized(value),
        }
    }
}

impl fmt::Display for StartingPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Earliest => write!(f, "EARLIEST"),
            Self::Latest => write!(f, "LATEST"),
            Self::TrimHorizon => write!(f, "TRIM_HORIZON"),
            Self::Unrecognized(value) => write!(f, "{}", value),
        }
    }
}

/// A streaming event binding as declared, every field optional
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartialEventDescriptor {
    pub arn: Option<String>,
    pub topic: Option<String>,
    pub batch_size: Option<u32>,
    pub maximum_batching_window: Option<u32>,
    pub starting_position: Option<StartingPosition>,
    pub enabled: Option<bool>,
}

/// A fully specified streaming event binding
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EventDescriptor {
    pub source_arn: String,
    pub topic: String,
    pub batch_size: u32,
    pub max_batching_window_seconds: u32,
    pub starting_position: StartingPosition,
    pub enabled: bool,
}

impl EventDescriptor {
    /// Anything but `LATEST` reads from the beginning, unrecognized values included.
    pub fn from_beginning(&self) -> bool {
        self.starting_position != StartingPosition::Latest
    }

    /// Problems worth a warning. Nothing here stops a session from starting.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.topic.is_empty() {
            issues.push("topic is empty".to_string());
        }
        if self.batch_size == 0 {
            issues.push("batchSize is 0".to_string());
        }
        if let StartingPosition::Unrecognized(value) = &self.starting_position {
            issues.push(format!(
                "startingPosition '{}' is not LATEST, reading from earliest",
                value
            ));
        }
        issues
    }
}

impl Default for EventDescriptor {
    fn default() -> Self {
        Self {
            source_arn: DEFAULT_SOURCE_ARN.to_string(),
            topic: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_batching_window_seconds: DEFAULT_MAX_BATCHING_WINDOW_SECONDS,
            starting_position: StartingPosition::Latest,
            enabled: true,
        }
    }
}

/// Fills every absent field of `partial` with its default.
pub fn normalize(partial: PartialEventDescriptor) -> EventDescriptor {
    let defaults = EventDescriptor::default();

    EventDescriptor {
        source_arn: partial.arn.unwrap_or(defaults.source_arn),
        topic: partial.topic.unwrap_or(defaults.topic),
        batch_size: partial.batch_size.unwrap_or(defaults.batch_size),
        max_batching_window_seconds: partial
            .maximum_batching_window
            .unwrap_or(defaults.max_batching_window_seconds),
        starting_position: partial
            .starting_position
            .unwrap_or(defaults.starting_position),
        enabled: partial.enabled.unwrap_or(defaults.enabled),
    }
}
