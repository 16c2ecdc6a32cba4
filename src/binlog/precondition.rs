use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, error};

/// Verifies the replication source can be replayed before any window runs.
pub trait PreconditionCheck: Send + Sync {
    fn check(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Server variables that govern what a row event carries.
///
/// Rollback SQL needs every column of both row images, which MySQL only
/// writes with `binlog_format=ROW` and `binlog_row_image=FULL`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationSettings {
    pub binlog_format: String,
    pub binlog_row_image: String,
}

impl ReplicationSettings {
    pub fn new(binlog_format: impl Into<String>, binlog_row_image: impl Into<String>) -> Self {
        Self {
            binlog_format: binlog_format.into(),
            binlog_row_image: binlog_row_image.into(),
        }
    }

    pub fn verify(&self) -> Result<()> {
        let format_ok = self.binlog_format.eq_ignore_ascii_case("ROW");
        let image_ok = self.binlog_row_image.eq_ignore_ascii_case("FULL");

        if format_ok && image_ok {
            debug!(
                binlog_format = %self.binlog_format,
                binlog_row_image = %self.binlog_row_image,
                "Replication settings are replay-safe"
            );
            return Ok(());
        }

        error!(
            binlog_format = %self.binlog_format,
            binlog_row_image = %self.binlog_row_image,
            "Replication settings are not replay-safe"
        );
        Err(Error::Precondition(format!(
            "binlog_format must be ROW and binlog_row_image must be FULL (got binlog_format={}, binlog_row_image={})",
            self.binlog_format, self.binlog_row_image
        )))
    }
}

impl PreconditionCheck for ReplicationSettings {
    async fn check(&self) -> Result<()> {
        self.verify()
    }
}
