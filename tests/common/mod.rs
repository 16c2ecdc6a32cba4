#![allow(dead_code)]

use binlog_rollback::binlog::{row, ChangeEvent, ReplicationSettings, Row, StreamPosition, Value};
use binlog_rollback::config::RunSettings;
use chrono::FixedOffset;
use std::path::PathBuf;

pub const BINLOG: &str = "mysql-bin.000124";

/// Run settings over `[start, end]` with everything optional switched off.
pub fn test_settings(start: i64, end: i64, workers: usize) -> RunSettings {
    RunSettings {
        events_path: PathBuf::from("events.jsonl"),
        tables: None,
        operation: None,
        window_start: start,
        window_end: end,
        worker_count: workers,
        max_in_flight: 8,
        resume_position: StreamPosition::new(BINLOG, 4),
        emit_alternate_reverse: false,
        echo_to_console: false,
        output_dir: PathBuf::from("."),
        utc_offset: FixedOffset::east_opt(8 * 3600).unwrap(),
        checkpoint_file: None,
        resume_from_checkpoint: false,
        replication: ReplicationSettings::new("ROW", "FULL"),
    }
}

pub fn at(offset: u64) -> StreamPosition {
    StreamPosition::new(BINLOG, offset)
}

pub fn id_name(id: i64, name: &str) -> Row {
    row([("id", Value::number(id)), ("name", Value::text(name))])
}

pub fn delete(table: &str, ts: i64, offset: u64, id: i64) -> ChangeEvent {
    ChangeEvent::delete("hcy", table, ts, at(offset), id_name(id, "a"))
}

pub fn insert(table: &str, ts: i64, offset: u64, id: i64) -> ChangeEvent {
    ChangeEvent::insert("hcy", table, ts, at(offset), id_name(id, "a"))
}

pub fn update(table: &str, ts: i64, offset: u64, id: i64, from: &str, to: &str) -> ChangeEvent {
    ChangeEvent::update("hcy", table, ts, at(offset), id_name(id, from), id_name(id, to))
}

/// JSON-lines form of an event as an external binlog decoder would write it.
pub fn jsonl_delete(table: &str, ts: i64, offset: u64, id: i64) -> String {
    format!(
        r#"{{"schema":"hcy","table":"{}","op":"delete","timestamp":{},"position":{{"file":"{}","offset":{}}},"values":{{"id":{},"name":"a"}}}}"#,
        table, ts, BINLOG, offset, id
    )
}
