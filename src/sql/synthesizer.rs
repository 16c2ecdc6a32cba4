use std::collections::HashSet;

use tracing::{debug, trace};

use super::render::{qualified_table, quote_identifier, render_assignment, render_predicate, render_value};
use crate::binlog::{ChangeEvent, Operation, Row};
use crate::{Error, Result};

/// Which events the synthesizer turns into statements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub operation: Option<Operation>,
    pub tables: Option<HashSet<String>>,
}

impl EventFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if self.operation.is_some_and(|op| op != event.operation) {
            return false;
        }
        self.tables
            .as_ref()
            .map_or(true, |tables| tables.contains(&event.table))
    }
}

/// Forward and rollback statements for one change event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    pub forward: String,
    pub reverse: String,
    /// `REPLACE INTO` rollback for updates whose row images share a column set.
    pub alternate_reverse: Option<String>,
}

/// Stateless translator from change events to SQL statement pairs.
#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    filter: EventFilter,
}

impl Synthesizer {
    pub fn new(filter: EventFilter) -> Self {
        Self { filter }
    }

    /// Returns `Ok(None)` for events excluded by the filter.
    ///
    /// Fails with [`Error::MalformedEvent`] when a row image the operation needs
    /// is absent or empty, rather than emitting an empty `SET` or `WHERE`.
    pub fn synthesize(&self, event: &ChangeEvent) -> Result<Option<SynthesisResult>> {
        if !self.filter.matches(event) {
            trace!(
                "Filtered out {} on {} at {}",
                event.operation,
                event.qualified_name(),
                event.position
            );
            return Ok(None);
        }

        let table = qualified_table(&event.schema, &event.table);

        let result = match event.operation {
            Operation::Insert => {
                let after = required(event, &event.after)?;
                SynthesisResult {
                    forward: insert_statement(&table, after),
                    reverse: delete_statement(&table, after),
                    alternate_reverse: None,
                }
            }
            Operation::Delete => {
                let values = required(event, &event.before)?;
                SynthesisResult {
                    forward: delete_statement(&table, values),
                    reverse: insert_statement(&table, values),
                    alternate_reverse: None,
                }
            }
            Operation::Update => {
                let before = required(event, &event.before)?;
                let after = required(event, &event.after)?;
                let alternate_reverse = replace_statement(&table, after, before);
                if alternate_reverse.is_none() {
                    debug!(
                        "Row images of {} at {} differ in columns, no REPLACE rollback",
                        event.qualified_name(),
                        event.position
                    );
                }
                SynthesisResult {
                    forward: update_statement(&table, after, before),
                    reverse: update_statement(&table, before, after),
                    alternate_reverse,
                }
            }
        };

        Ok(Some(result))
    }
}

fn required<'a>(event: &ChangeEvent, image: &'a Option<Row>) -> Result<&'a Row> {
    match image {
        Some(row) if !row.is_empty() => Ok(row),
        _ => Err(Error::MalformedEvent {
            schema: event.schema.clone(),
            table: event.table.clone(),
            position: event.position.clone(),
        }),
    }
}

fn column_list(row: &Row) -> String {
    row.keys()
        .map(|column| quote_identifier(column))
        .collect::<Vec<_>>()
        .join(",")
}

fn where_clause(row: &Row) -> String {
    row.iter()
        .map(|(column, value)| render_predicate(column, value))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn insert_statement(table: &str, row: &Row) -> String {
    let values = row.values().map(render_value).collect::<Vec<_>>().join(",");
    format!("INSERT INTO {} ({}) VALUES ({});", table, column_list(row), values)
}

fn delete_statement(table: &str, row: &Row) -> String {
    format!("DELETE FROM {} WHERE {};", table, where_clause(row))
}

fn update_statement(table: &str, set: &Row, filter: &Row) -> String {
    let assignments = set
        .iter()
        .map(|(column, value)| render_assignment(column, value))
        .collect::<Vec<_>>()
        .join(",");
    format!("UPDATE {} SET {} WHERE {};", table, assignments, where_clause(filter))
}

/// Columns in `after` order, values taken from `before`.
fn replace_statement(table: &str, after: &Row, before: &Row) -> Option<String> {
    if after.len() != before.len() {
        return None;
    }
    let values = after
        .keys()
        .map(|column| before.get(column).map(render_value))
        .collect::<Option<Vec<_>>>()?
        .join(",");
    Some(format!(
        "REPLACE INTO {} ({}) VALUES ({});",
        table,
        column_list(after),
        values
    ))
}
