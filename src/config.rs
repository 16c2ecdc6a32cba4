use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};

use crate::binlog::{Operation, ReplicationSettings, StreamPosition};
use crate::sql::EventFilter;
use crate::{Error, Result};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    pub window: WindowConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    /// JSON-lines feed of decoded row events.
    pub events_path: PathBuf,
    pub binlog_file: String,
    #[serde(default = "default_binlog_pos")]
    pub binlog_pos: u64,
    /// `binlog_format` as reported by the server.
    pub binlog_format: String,
    /// `binlog_row_image` as reported by the server.
    pub binlog_row_image: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub tables: Option<Vec<String>>,
    #[serde(default)]
    pub operation: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowConfig {
    pub start: String,
    pub end: String,
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub emit_alternate_reverse: bool,
    #[serde(default)]
    pub echo_to_console: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub checkpoint_file: Option<PathBuf>,
    #[serde(default)]
    pub resume_from_checkpoint: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_in_flight: default_max_in_flight(),
            emit_alternate_reverse: false,
            echo_to_console: false,
            output_dir: default_output_dir(),
            checkpoint_file: None,
            resume_from_checkpoint: false,
        }
    }
}

/// Values given on the command line, applied over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub events_path: Option<String>,
    pub binlog_file: Option<String>,
    pub binlog_pos: Option<u64>,
    pub binlog_format: Option<String>,
    pub binlog_row_image: Option<String>,
    pub tables: Option<Vec<String>>,
    pub operation: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub utc_offset: Option<String>,
    pub worker_count: Option<usize>,
    pub emit_alternate_reverse: bool,
    pub echo_to_console: bool,
    pub output_dir: Option<String>,
    pub checkpoint_file: Option<String>,
    pub resume_from_checkpoint: bool,
}

/// Validated settings the generator runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub events_path: PathBuf,
    pub tables: Option<HashSet<String>>,
    pub operation: Option<Operation>,
    pub window_start: i64,
    pub window_end: i64,
    pub worker_count: usize,
    pub max_in_flight: usize,
    pub resume_position: StreamPosition,
    pub emit_alternate_reverse: bool,
    pub echo_to_console: bool,
    pub output_dir: PathBuf,
    pub utc_offset: FixedOffset,
    pub checkpoint_file: Option<PathBuf>,
    pub resume_from_checkpoint: bool,
    pub replication: ReplicationSettings,
}

impl RunSettings {
    pub fn event_filter(&self) -> EventFilter {
        EventFilter {
            operation: self.operation,
            tables: self.tables.clone(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, config::ConfigError> {
        Self::load(Some(path.as_ref()), &ConfigOverrides::default())
    }

    /// Layers an optional config file, `BINLOG_ROLLBACK__*` environment
    /// variables and command-line overrides, in increasing precedence.
    pub fn load(
        path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("BINLOG_ROLLBACK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("filter.tables"),
            )
            .set_override_option("source.events_path", overrides.events_path.clone())?
            .set_override_option("source.binlog_file", overrides.binlog_file.clone())?
            .set_override_option("source.binlog_pos", overrides.binlog_pos.map(|p| p.to_string()))?
            .set_override_option("source.binlog_format", overrides.binlog_format.clone())?
            .set_override_option("source.binlog_row_image", overrides.binlog_row_image.clone())?
            .set_override_option("filter.tables", overrides.tables.clone())?
            .set_override_option("filter.operation", overrides.operation.clone())?
            .set_override_option("window.start", overrides.start.clone())?
            .set_override_option("window.end", overrides.end.clone())?
            .set_override_option("window.utc_offset", overrides.utc_offset.clone())?
            .set_override_option("run.worker_count", overrides.worker_count.map(|n| n.to_string()))?
            .set_override_option(
                "run.emit_alternate_reverse",
                overrides.emit_alternate_reverse.then_some(true),
            )?
            .set_override_option("run.echo_to_console", overrides.echo_to_console.then_some(true))?
            .set_override_option("run.output_dir", overrides.output_dir.clone())?
            .set_override_option("run.checkpoint_file", overrides.checkpoint_file.clone())?
            .set_override_option(
                "run.resume_from_checkpoint",
                overrides.resume_from_checkpoint.then_some(true),
            )?
            .build()?;

        settings.try_deserialize()
    }

    /// Checks every setting before any work starts.
    pub fn validate(&self) -> Result<RunSettings> {
        let operation = self
            .filter
            .operation
            .as_deref()
            .filter(|op| !op.trim().is_empty())
            .map(str::parse::<Operation>)
            .transpose()
            .map_err(Error::Config)?;

        let tables = self
            .filter
            .tables
            .as_ref()
            .map(|tables| {
                tables
                    .iter()
                    .flat_map(|t| t.split(','))
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect::<HashSet<_>>()
            })
            .filter(|tables| !tables.is_empty());

        let utc_offset = parse_utc_offset(&self.window.utc_offset)?;
        let window_start = parse_wall_clock(&self.window.start, &utc_offset)?;
        let window_end = parse_wall_clock(&self.window.end, &utc_offset)?;
        if window_end <= window_start {
            return Err(Error::Config(format!(
                "end time {} must be after start time {}",
                self.window.end, self.window.start
            )));
        }

        if self.run.worker_count == 0 {
            return Err(Error::Config("worker_count must be positive".to_string()));
        }
        if self.run.max_in_flight == 0 {
            return Err(Error::Config("max_in_flight must be positive".to_string()));
        }
        if self.source.binlog_file.trim().is_empty() {
            return Err(Error::Config("binlog_file is required".to_string()));
        }

        Ok(RunSettings {
            events_path: self.source.events_path.clone(),
            tables,
            operation,
            window_start,
            window_end,
            worker_count: self.run.worker_count,
            max_in_flight: self.run.max_in_flight,
            resume_position: StreamPosition::new(self.source.binlog_file.trim(), self.source.binlog_pos),
            emit_alternate_reverse: self.run.emit_alternate_reverse,
            echo_to_console: self.run.echo_to_console,
            output_dir: self.run.output_dir.clone(),
            utc_offset,
            checkpoint_file: self.run.checkpoint_file.clone(),
            resume_from_checkpoint: self.run.resume_from_checkpoint,
            replication: ReplicationSettings::new(
                self.source.binlog_format.clone(),
                self.source.binlog_row_image.clone(),
            ),
        })
    }
}

/// Parses `+HH:MM`, `-HH:MM`, `+HH`, `Z` or `UTC`.
pub fn parse_utc_offset(text: &str) -> Result<FixedOffset> {
    let text = text.trim();
    let invalid = || Error::Config(format!("invalid utc_offset '{}', expected e.g. +08:00", text));

    if text.eq_ignore_ascii_case("z") || text.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match text.chars().next() {
        Some('+') => (1, &text[1..]),
        Some('-') => (-1, &text[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None => (rest, "0"),
    };
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Interprets `YYYY-MM-DD HH:MM:SS` in `offset`, returning epoch seconds.
pub fn parse_wall_clock(text: &str, offset: &FixedOffset) -> Result<i64> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), TIME_FORMAT).map_err(|e| {
        Error::Config(format!("invalid time '{}' (expected YYYY-MM-DD HH:MM:SS): {}", text, e))
    })?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| Error::Config(format!("ambiguous time '{}'", text)))
}

fn default_binlog_pos() -> u64 {
    4
}

fn default_utc_offset() -> String {
    "+08:00".to_string()
}

fn default_worker_count() -> usize {
    4
}

fn default_max_in_flight() -> usize {
    1024
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
