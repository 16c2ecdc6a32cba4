use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info, trace};

use super::types::{ChangeEvent, Operation, Row, StreamPosition, Value};
use crate::{Error, Result};

/// An ordered, restartable feed of decoded row change events.
///
/// Sources are scoped to a table allow-list when constructed. The window
/// runner is the only owner of a source; workers never touch it.
pub trait EventSource: Send {
    /// (Re)opens the feed so the next event is the first one after `from`.
    fn open(&mut self, from: &StreamPosition) -> impl Future<Output = Result<()>> + Send;

    /// Yields the next event, or `None` once the feed is exhausted.
    fn next_event(&mut self) -> impl Future<Output = Result<Option<ChangeEvent>>> + Send;

    /// Position after the most recently yielded event.
    fn position(&self) -> StreamPosition;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

fn table_allowed(tables: &Option<HashSet<String>>, table: &str) -> bool {
    tables.as_ref().map_or(true, |allowed| allowed.contains(table))
}

/// Reads events that an external binlog reader has already decoded, one JSON
/// object per line:
///
/// ```json
/// {"schema":"hcy","table":"t1","op":"delete","timestamp":1688608800,
///  "position":{"file":"mysql-bin.000124","offset":1234},
///  "before":{"id":5,"name":"a","created":{"temporal":"2023-07-06 10:00:00"}}}
/// ```
pub struct JsonLinesSource {
    path: PathBuf,
    tables: Option<HashSet<String>>,
    lines: Option<Lines<BufReader<File>>>,
    from: StreamPosition,
    position: StreamPosition,
    line_no: usize,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    #[serde(default)]
    schema: String,
    table: String,
    op: Operation,
    timestamp: i64,
    position: StreamPosition,
    #[serde(default)]
    before: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    after: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    values: Option<serde_json::Map<String, serde_json::Value>>,
}

fn classify_row(columns: serde_json::Map<String, serde_json::Value>) -> Row {
    columns
        .into_iter()
        .map(|(name, value)| (name, Value::from_json(value)))
        .collect()
}

impl EventRecord {
    fn into_event(self) -> ChangeEvent {
        let (before, after) = match self.op {
            Operation::Insert => (self.before, self.after.or(self.values)),
            Operation::Delete => (self.before.or(self.values), self.after),
            Operation::Update => (self.before, self.after),
        };

        ChangeEvent {
            schema: self.schema,
            table: self.table,
            operation: self.op,
            timestamp: self.timestamp,
            position: self.position,
            before: before.map(classify_row),
            after: after.map(classify_row),
        }
    }
}

impl JsonLinesSource {
    pub fn new(path: impl AsRef<Path>, tables: Option<HashSet<String>>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            tables,
            lines: None,
            from: StreamPosition::default(),
            position: StreamPosition::default(),
            line_no: 0,
        }
    }

    fn decode(&self, line: &str) -> Result<ChangeEvent> {
        serde_json::from_str::<EventRecord>(line)
            .map(EventRecord::into_event)
            .map_err(|e| Error::InvalidEvent {
                message: format!("{}:{}: {}", self.path.display(), self.line_no, e),
            })
    }
}

impl EventSource for JsonLinesSource {
    async fn open(&mut self, from: &StreamPosition) -> Result<()> {
        let file = File::open(&self.path).await.map_err(|e| {
            Error::Source(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        info!("Opened event feed {:?} after {}", self.path, from);
        self.lines = Some(BufReader::new(file).lines());
        self.from = from.clone();
        self.position = from.clone();
        self.line_no = 0;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChangeEvent>> {
        loop {
            let lines = self
                .lines
                .as_mut()
                .ok_or_else(|| Error::Source("event feed is not open".to_string()))?;

            let line = match lines.next_line().await? {
                Some(line) => line,
                None => return Ok(None),
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            let event = self.decode(&line)?;
            if event.position <= self.from {
                trace!("Skipping event at {} (before resume point)", event.position);
                continue;
            }
            if !table_allowed(&self.tables, &event.table) {
                trace!("Skipping event for table {} (not in allow-list)", event.table);
                continue;
            }

            self.position = event.position.clone();
            return Ok(Some(event));
        }
    }

    fn position(&self) -> StreamPosition {
        self.position.clone()
    }

    async fn close(&mut self) -> Result<()> {
        if self.lines.take().is_some() {
            debug!("Closed event feed {:?} at {}", self.path, self.position);
        }
        Ok(())
    }
}

/// In-memory event feed.
#[derive(Debug, Default)]
pub struct VecEventSource {
    events: Vec<ChangeEvent>,
    tables: Option<HashSet<String>>,
    cursor: Option<usize>,
    from: StreamPosition,
    position: StreamPosition,
    open_count: usize,
}

impl VecEventSource {
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn with_tables(mut self, tables: Option<HashSet<String>>) -> Self {
        self.tables = tables;
        self
    }

    /// How many times the feed has been opened.
    pub fn open_count(&self) -> usize {
        self.open_count
    }
}

impl EventSource for VecEventSource {
    async fn open(&mut self, from: &StreamPosition) -> Result<()> {
        self.cursor = Some(0);
        self.from = from.clone();
        self.position = from.clone();
        self.open_count += 1;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChangeEvent>> {
        let mut cursor = self
            .cursor
            .ok_or_else(|| Error::Source("event feed is not open".to_string()))?;

        while let Some(event) = self.events.get(cursor) {
            cursor += 1;
            if event.position <= self.from || !table_allowed(&self.tables, &event.table) {
                continue;
            }
            self.cursor = Some(cursor);
            self.position = event.position.clone();
            return Ok(Some(event.clone()));
        }

        self.cursor = Some(cursor);
        Ok(None)
    }

    fn position(&self) -> StreamPosition {
        self.position.clone()
    }

    async fn close(&mut self) -> Result<()> {
        self.cursor = None;
        Ok(())
    }
}
