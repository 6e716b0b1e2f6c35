//! Trino wire types and value conversion.
//!
//! The statement protocol returns cells as plain JSON; the column type
//! signature decides how each cell becomes a [`Value`].

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::services::traits::{ColumnInfo, Value};

/// One page of a `/v1/statement` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementPage {
    pub id: Option<String>,
    pub next_uri: Option<String>,
    pub columns: Option<Vec<TrinoColumn>>,
    pub data: Option<Vec<Vec<JsonValue>>>,
    pub error: Option<TrinoError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrinoColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Failure reported inside a statement response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrinoError {
    pub message: String,
    pub error_name: Option<String>,
    pub error_type: Option<String>,
    pub error_code: Option<i64>,
}

impl std::fmt::Display for TrinoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error_name {
            Some(name) => write!(f, "{}: {}", name, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// `/v1/info` payload
#[derive(Debug, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub starting: bool,
}

pub fn column_info(columns: &[TrinoColumn]) -> Vec<ColumnInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(ordinal, c)| ColumnInfo::new(c.name.clone(), c.type_name.clone(), ordinal))
        .collect()
}

/// Base name of a type signature: `decimal(10,2)` -> `decimal`.
fn base_type(type_name: &str) -> String {
    let lower = type_name.trim().to_lowercase();
    match lower.find('(') {
        Some(idx) => lower[..idx].trim().to_string(),
        None => lower,
    }
}

/// Element type of `array(T)`.
fn element_type(type_name: &str) -> &str {
    let start = type_name.find('(').map(|i| i + 1).unwrap_or(0);
    let end = type_name.rfind(')').unwrap_or(type_name.len());
    if start <= end { &type_name[start..end] } else { "" }
}

/// Convert one JSON cell according to its Trino type signature.
pub fn convert_value(type_name: &str, raw: &JsonValue) -> Value {
    if raw.is_null() {
        return Value::Null;
    }

    let base = base_type(type_name);
    let converted = match base.as_str() {
        "boolean" => raw.as_bool().map(Value::Bool),
        "tinyint" => raw.as_i64().and_then(|v| i8::try_from(v).ok()).map(Value::Int8),
        "smallint" => raw.as_i64().and_then(|v| i16::try_from(v).ok()).map(Value::Int16),
        "integer" => raw.as_i64().and_then(|v| i32::try_from(v).ok()).map(Value::Int32),
        "bigint" => raw.as_i64().map(Value::Int64),
        "real" => float_value(raw).map(|v| Value::Float32(v as f32)),
        "double" => float_value(raw).map(Value::Float64),
        "varchar" | "char" => raw.as_str().map(|s| Value::Text(s.to_string())),
        "decimal" => raw.as_str().and_then(|s| Decimal::from_str(s).ok()).map(Value::Decimal),
        "date" => raw
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .map(Value::Date),
        "time" => raw
            .as_str()
            .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok())
            .map(Value::Time),
        "timestamp" if type_name.to_lowercase().contains("with time zone") => {
            raw.as_str().and_then(parse_timestamp_tz).map(Value::DateTimeTz)
        }
        "timestamp" => raw
            .as_str()
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
            .map(Value::DateTime),
        "uuid" => raw.as_str().and_then(|s| Uuid::parse_str(s).ok()).map(Value::Uuid),
        "varbinary" => raw
            .as_str()
            .and_then(|s| BASE64.decode(s).ok())
            .map(Value::Bytes),
        "array" => raw.as_array().map(|items| {
            let inner = element_type(type_name);
            Value::Array(items.iter().map(|item| convert_value(inner, item)).collect())
        }),
        "json" => Some(match raw.as_str() {
            Some(s) => serde_json::from_str(s)
                .map_or_else(|_| Value::Text(s.to_string()), Value::Json),
            None => Value::Json(raw.clone()),
        }),
        "map" | "row" => Some(Value::Json(raw.clone())),
        _ => None,
    };

    converted.unwrap_or_else(|| Value::Other {
        type_name: type_name.to_string(),
        display: match raw {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        },
    })
}

/// Trino sends non-finite doubles as strings.
fn float_value(raw: &JsonValue) -> Option<f64> {
    match raw {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

/// Parses `2024-01-01 10:00:00.000 UTC` and numeric offsets like `+02:00`.
fn parse_timestamp_tz(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f %:z") {
        return Some(dt.with_timezone(&Utc));
    }
    let (local, zone) = s.rsplit_once(' ')?;
    if zone.eq_ignore_ascii_case("UTC") || zone == "Z" {
        return NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc());
    }
    None
}
