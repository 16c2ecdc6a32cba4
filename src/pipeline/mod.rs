pub mod collector;
pub mod emitter;
pub mod partition;
pub mod position;
pub mod runner;

pub use collector::{Collector, ReversibleStatement};
pub use emitter::{ArtifactKey, ArtifactVariant, Emitter, FileSink, MemorySink, OutputSink};
pub use partition::{partition, WindowTask};
pub use position::PositionTracker;
pub use runner::{MalformedReport, RunnerOutcome, RunnerSettings, WindowRunner};
