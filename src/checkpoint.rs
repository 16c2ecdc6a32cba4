//! Checkpoint persistence for resumable re-runs.
//!
//! After a run, the furthest binlog position that was scanned into a window is
//! written to disk. A later run started with `resume_from_checkpoint` begins
//! reading after that position instead of the configured one.
//!
//! # Example
//!
//! ```rust,no_run
//! use binlog_rollback::binlog::StreamPosition;
//! use binlog_rollback::checkpoint::{Checkpoint, CheckpointManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = CheckpointManager::new("rollback-checkpoint.json");
//!
//!     if let Some(checkpoint) = manager.load().await? {
//!         println!("Resuming after {}", checkpoint.position);
//!     }
//!
//!     let checkpoint = Checkpoint::new(StreamPosition::new("mysql-bin.000124", 4567), 12);
//!     manager.save(&checkpoint).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::binlog::StreamPosition;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// The furthest position a run covered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub position: StreamPosition,
    /// When this checkpoint was written.
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Statements emitted by the run that wrote it.
    pub statement_count: u64,
}

impl Checkpoint {
    /// Creates a checkpoint stamped with the current time.
    ///
    /// # Example
    ///
    /// ```rust
    /// use binlog_rollback::binlog::StreamPosition;
    /// use binlog_rollback::checkpoint::Checkpoint;
    ///
    /// let checkpoint = Checkpoint::new(StreamPosition::new("mysql-bin.000002", 120), 3);
    /// assert_eq!(checkpoint.position.offset, 120);
    /// assert_eq!(checkpoint.statement_count, 3);
    /// ```
    pub fn new(position: StreamPosition, statement_count: u64) -> Self {
        Self {
            position,
            timestamp: chrono::Utc::now(),
            statement_count,
        }
    }
}

/// Reads and atomically writes a checkpoint file.
pub struct CheckpointManager {
    file_path: PathBuf,
}

impl CheckpointManager {
    pub fn new(checkpoint_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: checkpoint_path.as_ref().to_path_buf(),
        }
    }

    /// Loads the checkpoint, or `None` if no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the file exists but cannot be read or parsed.
    pub async fn load(&self) -> Result<Option<Checkpoint>> {
        if !fs::try_exists(&self.file_path).await? {
            debug!("No checkpoint file found at {:?}", self.file_path);
            return Ok(None);
        }

        let content = fs::read_to_string(&self.file_path).await.map_err(|e| {
            error!("Failed to read checkpoint file: {}", e);
            Error::Io(e)
        })?;

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                info!(
                    "Loaded checkpoint: position={}, timestamp={}",
                    checkpoint.position, checkpoint.timestamp
                );
                Ok(Some(checkpoint))
            }
            Err(e) => {
                error!("Failed to parse checkpoint file: {}", e);
                Err(Error::Serialization(e))
            }
        }
    }

    /// Saves the checkpoint through a synced temporary file and a rename, so
    /// the checkpoint file is never observed half-written.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        debug!("Saving checkpoint: position={}", checkpoint.position);

        let temp_path = self.file_path.with_extension("tmp");

        let json = serde_json::to_string_pretty(checkpoint)?;
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.file_path).await?;

        debug!("Checkpoint saved successfully");
        Ok(())
    }

    /// Deletes the checkpoint file if it exists.
    pub async fn delete(&self) -> Result<()> {
        if fs::try_exists(&self.file_path).await? {
            fs::remove_file(&self.file_path).await?;
            info!("Deleted checkpoint file");
        }
        Ok(())
    }
}
