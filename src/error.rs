//! Error types and result handling for binlog-rollback.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! Most variants are fatal and unwind the whole run. The exception is
//! [`Error::MalformedEvent`], which the window runner catches per event and
//! records in the run report so a partial rollback script is still produced.
//!
//! # Example
//!
//! ```rust
//! use binlog_rollback::{Error, Result};
//!
//! fn check_workers(workers: usize) -> Result<()> {
//!     if workers == 0 {
//!         return Err(Error::Config("worker_count must be positive".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! match check_workers(0) {
//!     Ok(()) => println!("ok"),
//!     Err(Error::Config(msg)) => eprintln!("Configuration error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use crate::binlog::StreamPosition;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for binlog-rollback operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid run configuration: operation filter, time window or worker count.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration sources could not be read or deserialized.
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// The replication source is not configured for full row images.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A change event lacks the row image its operation requires.
    #[error("Malformed event for {schema}.{table} at {position}")]
    MalformedEvent {
        schema: String,
        table: String,
        position: StreamPosition,
    },

    /// A rollback artifact could not be appended to.
    #[error("Failed to write {}: {source}", path.display())]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The event source failed while being opened or scanned.
    #[error("Event source error: {0}")]
    Source(String),

    /// A record from the event source could not be decoded.
    #[error("Invalid event: {message}")]
    InvalidEvent {
        /// Description of what was invalid
        message: String,
    },

    /// A synthesis task panicked or was aborted.
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// JSON serialization error, typically from checkpoint files.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error outside of artifact writes.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenient Result type alias for binlog-rollback operations.
///
/// This is equivalent to `std::result::Result<T, binlog_rollback::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_event_identifies_row() {
        let err = Error::MalformedEvent {
            schema: "hcy".to_string(),
            table: "t1".to_string(),
            position: StreamPosition::new("mysql-bin.000124", 1234),
        };

        assert_eq!(
            err.to_string(),
            "Malformed event for hcy.t1 at mysql-bin.000124:1234"
        );
    }

    #[test]
    fn test_sink_write_names_the_artifact() {
        let err = Error::SinkWrite {
            path: PathBuf::from("out/hcy_t1_recover_stamp.sql"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };

        assert_eq!(err.to_string(), "Failed to write out/hcy_t1_recover_stamp.sql: denied");
        assert!(std::error::Error::source(&err).is_some());
    }
}
