/// Host function and event declarations
pub mod declarations;

/// Streaming event descriptors
pub mod descriptor;

pub use declarations::{FunctionDeclaration, ServiceDefinition, StreamingBinding};
pub use descriptor::{normalize, EventDescriptor, PartialEventDescriptor, StartingPosition};
