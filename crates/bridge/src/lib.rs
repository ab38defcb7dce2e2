//! Offline MSK bridge
//!
//! Consumes batches from Kafka topics declared as `msk` events on local
//! functions and invokes those functions with the same payload a managed
//! MSK trigger would send.

/// Broker client boundary and the Kafka implementation
pub mod broker;

/// Process configuration
pub mod config;

/// Invocation dispatch
pub mod dispatch;

/// Errors
pub mod errors;

/// Event declarations and descriptors
pub mod events;

/// Per-batch offset and liveness handling
pub mod flow;

/// Session manager
pub mod manager;

/// Lifecycle hooks exposed to the host
pub mod plugin;

/// Record transformation
pub mod records;

/// Consumer sessions
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{AckMode, ClientConfig, Config, InvokerConfig, MalformedEventsPolicy};
pub use errors::Error;
pub use events::{EventDescriptor, FunctionDeclaration, ServiceDefinition, StartingPosition};
pub use manager::{ServiceState, SessionManager};
pub use plugin::OfflineMsk;
pub use records::{BatchEnvelope, RawRecord, TransformedRecord};
