use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A column value, classified once when the event is constructed.
///
/// The classification decides quoting: `Text` and `Temporal` are rendered as
/// string literals, `Number` verbatim, `Null` as the SQL keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Text(String),
    Temporal(String),
    Number(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn temporal(s: impl Into<String>) -> Self {
        Value::Temporal(s.into())
    }

    pub fn number(n: impl ToString) -> Self {
        Value::Number(n.to_string())
    }

    /// Classifies a decoded JSON value.
    ///
    /// Single-key objects `{"temporal": ..}`, `{"number": ..}` and `{"text": ..}`
    /// carry an explicit class; any other object or array is kept as its JSON text.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Number(if b { "1" } else { "0" }.to_string()),
            serde_json::Value::Number(n) => Value::Number(n.to_string()),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    let classified = map.iter().next().and_then(|(class, inner)| {
                        match (class.as_str(), inner) {
                            ("temporal", serde_json::Value::String(s)) => {
                                Some(Value::Temporal(s.clone()))
                            }
                            ("number", serde_json::Value::String(s)) => Some(Value::Number(s.clone())),
                            ("number", serde_json::Value::Number(n)) => Some(Value::Number(n.to_string())),
                            ("text", serde_json::Value::String(s)) => Some(Value::Text(s.clone())),
                            _ => None,
                        }
                    });
                    if let Some(value) = classified {
                        return value;
                    }
                }
                Value::Text(serde_json::Value::Object(map).to_string())
            }
            other => Value::Text(other.to_string()),
        }
    }
}

/// Column name to value, in row-event column order.
pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[serde(alias = "INSERT", alias = "Insert")]
    Insert,
    #[serde(alias = "UPDATE", alias = "Update")]
    Update,
    #[serde(alias = "DELETE", alias = "Delete")]
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(format!(
                "invalid operation '{}', expected one of insert, update, delete",
                other
            )),
        }
    }
}

/// A position in the binlog stream, ordered by file then offset.
///
/// Files are ordered by base name, then by the numeric value of their
/// rotation suffix, so `mysql-bin.999999` sorts before `mysql-bin.1000000`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamPosition {
    pub file: String,
    pub offset: u64,
}

impl StreamPosition {
    pub fn new(file: impl Into<String>, offset: u64) -> Self {
        Self {
            file: file.into(),
            offset,
        }
    }

    /// `(base, sequence)` of the file name; `sequence` is `None` when the
    /// name has no all-digit extension.
    fn rotation_key(&self) -> (&str, Option<u64>) {
        match self.file.rsplit_once('.') {
            Some((base, seq)) if !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()) => {
                (base, seq.parse().ok())
            }
            _ => (self.file.as_str(), None),
        }
    }
}

impl Ord for StreamPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rotation_key()
            .cmp(&other.rotation_key())
            .then_with(|| self.file.cmp(&other.file))
            .then_with(|| self.offset.cmp(&other.offset))
    }
}

impl PartialOrd for StreamPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.offset)
    }
}

/// One committed row mutation taken from the replication log.
///
/// `position` is the stream position immediately after the event, so a source
/// reopened from it continues with the next event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub schema: String,
    pub table: String,
    pub operation: Operation,
    /// Commit time, epoch seconds.
    pub timestamp: i64,
    pub position: StreamPosition,
    pub before: Option<Row>,
    pub after: Option<Row>,
}

impl ChangeEvent {
    pub fn insert(
        schema: impl Into<String>,
        table: impl Into<String>,
        timestamp: i64,
        position: StreamPosition,
        after: Row,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            operation: Operation::Insert,
            timestamp,
            position,
            before: None,
            after: Some(after),
        }
    }

    pub fn update(
        schema: impl Into<String>,
        table: impl Into<String>,
        timestamp: i64,
        position: StreamPosition,
        before: Row,
        after: Row,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            operation: Operation::Update,
            timestamp,
            position,
            before: Some(before),
            after: Some(after),
        }
    }

    pub fn delete(
        schema: impl Into<String>,
        table: impl Into<String>,
        timestamp: i64,
        position: StreamPosition,
        values: Row,
    ) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            operation: Operation::Delete,
            timestamp,
            position,
            before: Some(values),
            after: None,
        }
    }

    /// `schema.table`, or the bare table when the schema is unknown.
    pub fn qualified_name(&self) -> String {
        if self.schema.is_empty() {
            self.table.clone()
        } else {
            format!("{}.{}", self.schema, self.table)
        }
    }
}

/// Builds a [`Row`] from `(column, value)` pairs, keeping their order.
pub fn row<K, I>(columns: I) -> Row
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    columns.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_position_orders_by_file_then_offset() {
        let a = StreamPosition::new("mysql-bin.000001", 9000);
        let b = StreamPosition::new("mysql-bin.000002", 4);
        let c = StreamPosition::new("mysql-bin.000002", 120);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(std::cmp::max(a.clone(), c.clone()), c);
    }

    #[test]
    fn test_position_orders_across_suffix_width_change() {
        let last_six = StreamPosition::new("mysql-bin.999999", 90_000);
        let first_seven = StreamPosition::new("mysql-bin.1000000", 4);
        assert!(last_six < first_seven);
        assert_eq!(std::cmp::max(first_seven.clone(), last_six), first_seven);

        assert!(StreamPosition::new("mysql-bin.000009", 4) < StreamPosition::new("mysql-bin.000010", 4));
    }

    #[test]
    fn test_operation_parse_is_case_insensitive() {
        assert_eq!("DELETE".parse::<Operation>().unwrap(), Operation::Delete);
        assert_eq!(" Update ".parse::<Operation>().unwrap(), Operation::Update);
        assert!("truncate".parse::<Operation>().is_err());
    }

    #[test]
    fn test_value_classification() {
        assert_eq!(Value::from_json(json!(null)), Value::Null);
        assert_eq!(Value::from_json(json!(5)), Value::number(5));
        assert_eq!(Value::from_json(json!(1.5)), Value::number("1.5"));
        assert_eq!(Value::from_json(json!(true)), Value::number(1));
        assert_eq!(Value::from_json(json!("a")), Value::text("a"));
        assert_eq!(
            Value::from_json(json!({"temporal": "2023-07-06 10:00:00"})),
            Value::temporal("2023-07-06 10:00:00")
        );
        assert_eq!(
            Value::from_json(json!({"number": "12.50"})),
            Value::number("12.50")
        );
        assert_eq!(
            Value::from_json(json!({"a": 1, "b": 2})),
            Value::text(r#"{"a":1,"b":2}"#)
        );
        assert_eq!(Value::from_json(json!([1, 2])), Value::text("[1,2]"));
    }

    #[test]
    fn test_wide_numbers_keep_their_digits() {
        let columns: serde_json::Map<String, serde_json::Value> = serde_json::from_str(
            r#"{"price": 12345678901234567.89, "big": 123456789012345678901234567890, "rate": 0.10}"#,
        )
        .unwrap();
        let values: Vec<Value> = columns.into_iter().map(|(_, v)| Value::from_json(v)).collect();

        assert_eq!(
            values,
            vec![
                Value::number("12345678901234567.89"),
                Value::number("123456789012345678901234567890"),
                Value::number("0.10"),
            ]
        );
    }

    #[test]
    fn test_row_keeps_column_order() {
        let r = row([("z", Value::number(1)), ("a", Value::number(2))]);
        let keys: Vec<&str> = r.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn test_qualified_name_without_schema() {
        let event = ChangeEvent::insert("", "t1", 0, StreamPosition::default(), Row::new());
        assert_eq!(event.qualified_name(), "t1");
    }
}
