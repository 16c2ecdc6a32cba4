pub mod render;
pub mod synthesizer;


pub use render::{qualified_table, quote_identifier, render_predicate, render_value};
pub use synthesizer::{EventFilter, SynthesisResult, Synthesizer};
