pub mod checkpoint;
pub mod config;
pub mod error;
pub mod generator;

pub mod binlog;
pub mod pipeline;
pub mod sql;

pub use config::Config;
pub use error::{Error, Result};
pub use generator::{RollbackGenerator, RunReport};
