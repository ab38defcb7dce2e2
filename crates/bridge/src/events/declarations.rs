use std::{fs, path::Path};

use serde::Deserialize;
use serde_json::Value;

use crate::{config::MalformedEventsPolicy, errors::Error};

use super::descriptor::{normalize, EventDescriptor, PartialEventDescriptor};

/// Event key marking a streaming (MSK) binding
pub const STREAMING_EVENT_KEY: &str = "msk";

/// Consumer group used when a function declares no name
pub const DEFAULT_GROUP_ID: &str = "offline-msk-consumer-group";

/// A function as declared by the host. `events` is kept raw so a malformed
/// list can be reported instead of failing the whole definition.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct FunctionDeclaration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub events: Value,
}

/// Declared functions in declaration order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceDefinition {
    pub functions: Vec<(String, FunctionDeclaration)>,
}

/// One streaming event bound to the function that handles it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingBinding {
    pub function_key: String,
    pub function_name: Option<String>,
    pub descriptor: EventDescriptor,
}

impl StreamingBinding {
    pub fn group_id(&self) -> &str {
        self.function_name.as_deref().unwrap_or(DEFAULT_GROUP_ID)
    }

    /// Function name handed to the invocation client
    pub fn target_name(&self) -> &str {
        self.function_name.as_deref().unwrap_or(&self.function_key)
    }
}

impl ServiceDefinition {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        Self::from_value(serde_json::from_str(raw)?)
    }

    pub fn from_value(value: Value) -> Result<Self, Error> {
        let functions = match value.get("functions") {
            None | Some(Value::Null) => return Ok(Self::default()),
            Some(Value::Object(functions)) => functions,
            Some(_) => {
                return Err(Error::ServiceDefinition {
                    message: "'functions' must be an object".to_string(),
                })
            }
        };

        let functions = functions
            .iter()
            .filter_map(|(key, declaration)| {
                match serde_json::from_value::<FunctionDeclaration>(declaration.clone()) {
                    Ok(declaration) => Some((key.clone(), declaration)),
                    Err(e) => {
                        tracing::warn!(function = %key, "Skipping malformed function declaration: {}", e);
                        None
                    }
                }
            })
            .collect();

        Ok(Self { functions })
    }

    /// Every streaming event of every function, normalized, in declaration order.
    pub fn streaming_bindings(&self, policy: MalformedEventsPolicy) -> Vec<StreamingBinding> {
        let mut bindings = Vec::new();

        for (index, (key, function)) in self.functions.iter().enumerate() {
            let events = match &function.events {
                Value::Null => continue,
                Value::Array(events) => events,
                _ => match policy {
                    MalformedEventsPolicy::Stop => {
                        tracing::warn!(
                            function = %key,
                            unscanned = self.functions.len() - index - 1,
                            "events is not a list, stopping event enumeration"
                        );
                        break;
                    }
                    MalformedEventsPolicy::SkipFunction => {
                        tracing::warn!(function = %key, "events is not a list, skipping function");
                        continue;
                    }
                },
            };

            for event in events {
                let Some(binding) = event.get(STREAMING_EVENT_KEY) else {
                    continue;
                };

                let partial: PartialEventDescriptor = match serde_json::from_value(binding.clone())
                {
                    Ok(partial) => partial,
                    Err(e) => {
                        tracing::warn!(function = %key, "Skipping malformed msk event: {}", e);
                        continue;
                    }
                };

                bindings.push(StreamingBinding {
                    function_key: key.clone(),
                    function_name: function.name.clone(),
                    descriptor: normalize(partial),
                });
            }
        }

        bindings
    }
}
