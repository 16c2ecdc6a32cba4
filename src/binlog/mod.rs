pub mod precondition;
pub mod source;
pub mod types;

pub use precondition::{PreconditionCheck, ReplicationSettings};
pub use source::{EventSource, JsonLinesSource, VecEventSource};
pub use types::*;
