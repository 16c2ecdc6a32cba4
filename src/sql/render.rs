//! Rendering of identifiers and column values into MySQL statement text.
//!
//! Every function here is total: any [`Value`] renders to valid SQL text, and
//! `Null` never leaks out as a bare word other than `NULL` / `IS NULL`.

use crate::binlog::Value;

/// Backtick-quotes an identifier, doubling embedded backticks.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `` `schema`.`table` ``, or `` `table` `` when the schema is unknown.
pub fn qualified_table(schema: &str, table: &str) -> String {
    if schema.is_empty() {
        quote_identifier(table)
    } else {
        format!("{}.{}", quote_identifier(schema), quote_identifier(table))
    }
}

/// Escapes a string for use inside a single-quoted MySQL literal.
///
/// Quotes are doubled; backslashes and the control characters MySQL treats
/// specially are backslash-escaped, so the literal reads back byte-for-byte
/// under the default `sql_mode`.
pub fn escape_literal(value: &str) -> String {
    if !value.contains(['\'', '\\', '\0', '\n', '\r', '\x1a']) {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() + 8);
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out
}

/// Renders a value for a `VALUES (...)` list or the right side of a `SET` assignment.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Text(s) | Value::Temporal(s) => format!("'{}'", escape_literal(s)),
        Value::Number(n) => n.clone(),
    }
}

/// Renders a `WHERE` clause term matching `column` against `value`.
pub fn render_predicate(column: &str, value: &Value) -> String {
    match value {
        Value::Null => format!("{} IS NULL", quote_identifier(column)),
        other => format!("{}={}", quote_identifier(column), render_value(other)),
    }
}

/// Renders a `SET` clause assignment.
pub fn render_assignment(column: &str, value: &Value) -> String {
    format!("{}={}", quote_identifier(column), render_value(value))
}
