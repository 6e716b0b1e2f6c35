//! Result sets shared by the Trino and SQL clients.
//!
//! Trino hands back JSON cells tagged with engine type names, sqlx hands back
//! typed Postgres or SQLite columns. Both are decoded into [`Value`] so
//! callers see one `QueryResult` shape whichever backend answered.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One decoded cell, and also a bind parameter for `DatabaseClient`.
///
/// Integer width follows the source column (`tinyint` stays `Int8`, `int4`
/// stays `Int32`). Anything without a dedicated variant ends up in `Other`
/// with its textual form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    #[default]
    Null,

    Bool(bool),

    /// Trino `tinyint`; Postgres has no one-byte integer
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),

    /// Postgres `real`, Trino `real`
    Float32(f32),
    Float64(f64),

    Text(String),
    /// `bytea`, `varbinary` or a SQLite BLOB
    Bytes(Vec<u8>),

    Date(NaiveDate),
    Time(NaiveTime),
    /// `timestamp` without a zone
    DateTime(NaiveDateTime),
    /// `timestamptz` / `timestamp with time zone`, normalized to UTC
    DateTimeTz(DateTime<Utc>),

    /// `numeric` and Trino `decimal(p, s)`
    Decimal(Decimal),
    Uuid(Uuid),
    /// `json`/`jsonb`, plus Trino `map` and `row` cells
    Json(serde_json::Value),

    /// Trino `array(T)` and Postgres array columns
    Array(Vec<Value>),

    /// A column type no variant covers, e.g. `interval` or `inet`.
    Other {
        /// Type name as the backend reported it
        type_name: String,
        display: String,
    },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short variant name, independent of the backend that produced it.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::DateTime(_) => "datetime",
            Value::DateTimeTz(_) => "datetimetz",
            Value::Decimal(_) => "decimal",
            Value::Uuid(_) => "uuid",
            Value::Json(_) => "json",
            Value::Array(_) => "array",
            Value::Other { .. } => "other",
        }
    }

    /// Any integer variant, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Int8(v) => Some(v.into()),
            Value::Int16(v) => Some(v.into()),
            Value::Int32(v) => Some(v.into()),
            Value::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Text used by the CLI and as the bind form for arrays and `Other`.
/// Bytes render in the `\x...` hex form psql prints for `bytea`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "\\x{}", hex::encode(v)),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Time(v) => write!(f, "{}", v.format("%H:%M:%S%.f")),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::DateTimeTz(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f %Z")),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Uuid(v) => write!(f, "{v}"),
            Value::Json(v) => write!(f, "{v}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Other { display, .. } => f.write_str(display),
        }
    }
}

macro_rules! value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int32,
    i64 => Int64,
    f64 => Float64,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Column header of a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Unparsed engine type, e.g. `varchar(32)`, `INT4` or `TEXT`
    pub type_name: String,
    pub ordinal: usize,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            ordinal,
        }
    }
}

/// Values in column order; value `i` belongs to `QueryResult::columns[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Vec<Value>);

impl Row {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get_value(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl FromIterator<Value> for Row {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything a read returned, with Trino pages already concatenated.
///
/// `rows` keeps the order the backend produced; nothing here sorts or
/// deduplicates. `execution_time_ms` is wall time seen by the client,
/// including every page fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub execution_time_ms: u128,
}

impl QueryResult {
    pub fn new(columns: Vec<ColumnInfo>, rows: Vec<Row>, execution_time_ms: u128) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            execution_time_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Leading cell of each row; `SHOW TABLES` and `SHOW SCHEMAS` answer this way.
    pub fn first_column(&self) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|row| row.get_value(0).cloned())
            .collect()
    }

    /// Rows keyed by column name. A repeated name keeps the rightmost cell.
    pub fn records(&self) -> Vec<BTreeMap<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.values())
                    .map(|(col, value)| (col.name.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Int64(-123).to_string(), "-123");
        assert_eq!(Value::Float64(2.5).to_string(), "2.5");
        assert_eq!(Value::Bytes(vec![0xDE, 0xAD]).to_string(), "\\xdead");
        let nested = Value::Array(vec![Value::Int32(1), Value::Null, Value::from("a")]);
        assert_eq!(nested.to_string(), "[1, NULL, a]");
    }

    #[test]
    fn test_value_from_option() {
        let some_val: Value = Some(42i32).into();
        assert_eq!(some_val, Value::Int32(42));

        let none_val: Value = Option::<i32>::None.into();
        assert_eq!(none_val, Value::Null);
    }

    #[test]
    fn test_value_as_i64_widens() {
        assert_eq!(Value::Int8(7).as_i64(), Some(7));
        assert_eq!(Value::Int32(-3).as_i64(), Some(-3));
        assert_eq!(Value::Text("7".into()).as_i64(), None);
    }

    #[test]
    fn test_query_result_records() {
        let result = QueryResult::new(
            vec![
                ColumnInfo::new("id", "integer", 0),
                ColumnInfo::new("name", "varchar", 1),
            ],
            vec![
                Row::from_values(vec![Value::Int32(1), Value::from("alpha")]),
                Row::from_values(vec![Value::Int32(2), Value::from("beta")]),
            ],
            12,
        );

        assert_eq!(result.row_count, 2);
        assert_eq!(result.column_names(), vec!["id", "name"]);
        assert_eq!(result.first_column(), vec![Value::Int32(1), Value::Int32(2)]);

        let records = result.records();
        assert_eq!(records[1].get("name"), Some(&Value::from("beta")));

        let json = serde_json::to_value(&result.rows[0]).unwrap();
        assert_eq!(json[0], serde_json::json!({ "type": "Int32", "value": 1 }));
    }
}
