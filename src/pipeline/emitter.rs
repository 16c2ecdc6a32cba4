//! Global ordering and emission of collected statements.
//!
//! Once every window has finished, the collected statements are sorted by
//! `(event_time, sequence)` and written block by block to per-table artifacts,
//! optionally echoed to stdout. Nothing is reordered after the sort.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::collector::{Collector, ReversibleStatement};
use crate::{Error, Result};

const SEPARATOR: &str = "-- ----------------------------------------------------------";

/// Which rollback flavour an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactVariant {
    /// Inverse INSERT / DELETE / UPDATE statements.
    Primary,
    /// `REPLACE INTO` rollbacks for updates.
    Replace,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub schema: String,
    pub table: String,
    pub variant: ArtifactVariant,
}

impl ArtifactKey {
    pub fn for_statement(statement: &ReversibleStatement, variant: ArtifactVariant) -> Self {
        Self {
            schema: statement.schema.clone(),
            table: statement.table.clone(),
            variant,
        }
    }

    /// `<schema>_<table>_recover_<stamp>[_replace].sql`
    pub fn file_name(&self, stamp: &str) -> String {
        let base = if self.schema.is_empty() {
            self.table.clone()
        } else {
            format!("{}_{}", self.schema, self.table)
        };
        match self.variant {
            ArtifactVariant::Primary => format!("{}_recover_{}.sql", base, stamp),
            ArtifactVariant::Replace => format!("{}_recover_{}_replace.sql", base, stamp),
        }
    }
}

/// Append-only destination for rendered blocks.
pub trait OutputSink: Send {
    fn append(&mut self, key: &ArtifactKey, block: &str) -> impl Future<Output = Result<()>> + Send;

    fn flush(&mut self) -> impl Future<Output = Result<()>> + Send;
}

impl<O: OutputSink> OutputSink for &mut O {
    fn append(&mut self, key: &ArtifactKey, block: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).append(key, block)
    }

    fn flush(&mut self) -> impl Future<Output = Result<()>> + Send {
        (**self).flush()
    }
}

/// Writes one file per artifact key into a directory.
pub struct FileSink {
    dir: PathBuf,
    stamp: String,
    files: HashMap<ArtifactKey, (PathBuf, File)>,
}

impl FileSink {
    pub fn new(dir: impl AsRef<Path>, stamp: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            stamp: stamp.into(),
            files: HashMap::new(),
        }
    }

    /// Paths of every artifact written so far.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.values().map(|(path, _)| path.clone()).collect();
        paths.sort();
        paths
    }

    async fn file_for(&mut self, key: &ArtifactKey) -> Result<&mut (PathBuf, File)> {
        if !self.files.contains_key(key) {
            let path = self.dir.join(key.file_name(&self.stamp));
            fs::create_dir_all(&self.dir).await.map_err(|source| Error::SinkWrite {
                path: self.dir.clone(),
                source,
            })?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
                .map_err(|source| Error::SinkWrite {
                    path: path.clone(),
                    source,
                })?;
            info!("Writing rollback artifact {:?}", path);
            self.files.insert(key.clone(), (path, file));
        }

        self.files
            .get_mut(key)
            .ok_or_else(|| Error::Worker("artifact handle vanished".to_string()))
    }
}

impl OutputSink for FileSink {
    async fn append(&mut self, key: &ArtifactKey, block: &str) -> Result<()> {
        let (path, file) = self.file_for(key).await?;
        file.write_all(block.as_bytes())
            .await
            .map_err(|source| Error::SinkWrite {
                path: path.clone(),
                source,
            })
    }

    async fn flush(&mut self) -> Result<()> {
        for (path, file) in self.files.values_mut() {
            file.flush().await.map_err(|source| Error::SinkWrite {
                path: path.clone(),
                source,
            })?;
            file.sync_all().await.map_err(|source| Error::SinkWrite {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Keeps blocks in memory, in append order.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub blocks: Vec<(ArtifactKey, String)>,
}

impl OutputSink for MemorySink {
    async fn append(&mut self, key: &ArtifactKey, block: &str) -> Result<()> {
        self.blocks.push((key.clone(), block.to_string()));
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sorts by event time; equal times keep scan order.
pub fn order(mut statements: Vec<ReversibleStatement>) -> Vec<ReversibleStatement> {
    statements.sort_by_key(|s| (s.event_time, s.sequence));
    statements
}

pub fn format_event_time(event_time: i64, offset: &FixedOffset) -> String {
    match DateTime::from_timestamp(event_time, 0) {
        Some(utc) => utc.with_timezone(offset).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => event_time.to_string(),
    }
}

pub fn render_block(statement: &ReversibleStatement, offset: &FixedOffset) -> String {
    format!(
        "-- SQL execution time: {}\n-- Original SQL:\n \t-- {}\n-- Rollback SQL:\n \t{}\n{}\n",
        format_event_time(statement.event_time, offset),
        statement.forward_sql,
        statement.reverse_sql,
        SEPARATOR
    )
}

/// Drains collectors in global order into a sink.
pub struct Emitter<O: OutputSink> {
    sink: O,
    offset: FixedOffset,
    echo_to_console: bool,
}

impl<O: OutputSink> Emitter<O> {
    pub fn new(sink: O, offset: FixedOffset, echo_to_console: bool) -> Self {
        Self {
            sink,
            offset,
            echo_to_console,
        }
    }

    /// Emits everything in `collector`, returning how many blocks were written.
    ///
    /// A failed append aborts emission immediately.
    pub async fn emit(&mut self, collector: &Collector, variant: ArtifactVariant) -> Result<usize> {
        let ordered = order(collector.drain());
        debug!("Emitting {} {:?} statements", ordered.len(), variant);

        for statement in &ordered {
            let block = render_block(statement, &self.offset);
            if self.echo_to_console {
                println!("{}", block);
            }
            let key = ArtifactKey::for_statement(statement, variant);
            self.sink.append(&key, &block).await?;
        }

        Ok(ordered.len())
    }

    pub async fn finish(mut self) -> Result<O> {
        self.sink.flush().await?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn statement(event_time: i64, sequence: u64, table: &str) -> ReversibleStatement {
        ReversibleStatement {
            event_time,
            sequence,
            schema: "hcy".to_string(),
            table: table.to_string(),
            forward_sql: format!("DELETE FROM `hcy`.`{}` WHERE `id`={};", table, sequence),
            reverse_sql: format!("INSERT INTO `hcy`.`{}` (`id`) VALUES ({});", table, sequence),
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_order_by_time_then_sequence() {
        let ordered = order(vec![
            statement(30, 0, "t1"),
            statement(10, 2, "t1"),
            statement(20, 1, "t1"),
            statement(10, 1, "t1"),
        ]);
        let keys: Vec<(i64, u64)> = ordered.iter().map(|s| (s.event_time, s.sequence)).collect();
        assert_eq!(keys, vec![(10, 1), (10, 2), (20, 1), (30, 0)]);
    }

    #[test]
    fn test_block_format() {
        let shanghai = FixedOffset::east_opt(8 * 3600).unwrap();
        let block = render_block(&statement(1_688_608_800, 5, "t1"), &shanghai);
        assert_eq!(
            block,
            "-- SQL execution time: 2023-07-06 10:00:00\n\
             -- Original SQL:\n \t-- DELETE FROM `hcy`.`t1` WHERE `id`=5;\n\
             -- Rollback SQL:\n \tINSERT INTO `hcy`.`t1` (`id`) VALUES (5);\n\
             -- ----------------------------------------------------------\n"
        );
    }

    #[test]
    fn test_artifact_names() {
        let key = ArtifactKey {
            schema: "hcy".to_string(),
            table: "t1".to_string(),
            variant: ArtifactVariant::Replace,
        };
        assert_eq!(key.file_name("2023-07-06_10-00-00"), "hcy_t1_recover_2023-07-06_10-00-00_replace.sql");

        let bare = ArtifactKey {
            schema: String::new(),
            variant: ArtifactVariant::Primary,
            ..key
        };
        assert_eq!(bare.file_name("s"), "t1_recover_s.sql");
    }

    #[tokio::test]
    async fn test_emit_routes_per_table_in_order() {
        let collector = Collector::new();
        collector.push(statement(30, 2, "t1"));
        collector.push(statement(10, 0, "t2"));
        collector.push(statement(20, 1, "t1"));

        let mut emitter = Emitter::new(MemorySink::default(), utc(), false);
        assert_eq!(emitter.emit(&collector, ArtifactVariant::Primary).await.unwrap(), 3);
        let sink = emitter.finish().await.unwrap();

        let tables: Vec<&str> = sink.blocks.iter().map(|(k, _)| k.table.as_str()).collect();
        assert_eq!(tables, vec!["t2", "t1", "t1"]);
        assert!(sink.blocks[1].1.contains("`id`=1;"));
        assert!(collector.is_empty());
    }

    #[tokio::test]
    async fn test_file_sink_appends() {
        let dir = TempDir::new().unwrap();
        let mut sink = FileSink::new(dir.path(), "stamp");
        let key = ArtifactKey {
            schema: "hcy".to_string(),
            table: "t1".to_string(),
            variant: ArtifactVariant::Primary,
        };

        sink.append(&key, "first\n").await.unwrap();
        sink.append(&key, "second\n").await.unwrap();
        sink.flush().await.unwrap();

        let path = dir.path().join("hcy_t1_recover_stamp.sql");
        assert_eq!(sink.paths(), vec![path.clone()]);
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "first\nsecond\n");
    }

    #[tokio::test]
    async fn test_file_sink_reports_unwritable_target() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        tokio::fs::write(&blocker, b"x").await.unwrap();

        let mut sink = FileSink::new(&blocker, "stamp");
        let key = ArtifactKey {
            schema: "hcy".to_string(),
            table: "t1".to_string(),
            variant: ArtifactVariant::Primary,
        };
        let err = sink.append(&key, "block").await.unwrap_err();
        assert!(matches!(err, Error::SinkWrite { .. }));
    }
}
