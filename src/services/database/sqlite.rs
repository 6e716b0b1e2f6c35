//! SQLite driver.
//!
//! SQLite supports both file-based and in-memory databases. The pool holds a
//! single long-lived connection so an in-memory database lives exactly as
//! long as the driver.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};
use tokio::sync::RwLock;

use super::{SqlDriver, classify};
use crate::error::{DriverError, DriverResult};
use crate::services::lifecycle::DriverLifecycle;
use crate::services::traits::{ColumnInfo, QueryResult, Row, Value};

/// Where the SQLite database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    /// Private in-memory database
    Memory,
    /// Database file, created if missing
    File(PathBuf),
}

#[derive(Debug)]
pub struct SqliteDriver {
    target: SqliteTarget,
    pool: RwLock<Option<SqlitePool>>,
}

impl SqliteDriver {
    pub fn new(target: SqliteTarget) -> Self {
        Self {
            target,
            pool: RwLock::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(SqliteTarget::Memory)
    }

    fn connect_options(&self) -> DriverResult<SqliteConnectOptions> {
        let options = match &self.target {
            SqliteTarget::Memory => {
                SqliteConnectOptions::from_str("sqlite::memory:").map_err(DriverError::connection)?
            }
            SqliteTarget::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal),
        };
        Ok(options.foreign_keys(true))
    }

    async fn get_pool(&self) -> DriverResult<SqlitePool> {
        self.pool
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or_else(|| DriverError::connection(anyhow!("SQLite pool not connected")))
    }
}

#[async_trait]
impl DriverLifecycle for SqliteDriver {
    async fn open(&self) -> DriverResult<()> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(self.connect_options()?)
            .await
            .map_err(DriverError::connection)?;

        *self.pool.write().await = Some(pool);
        Ok(())
    }

    async fn ping(&self) -> DriverResult<()> {
        let pool = self.get_pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await.map_err(classify)?;
        Ok(())
    }

    async fn release(&self) -> DriverResult<()> {
        if let Some(pool) = self.pool.write().await.take() {
            pool.close().await;
        }
        Ok(())
    }
}

#[async_trait]
impl SqlDriver for SqliteDriver {
    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<QueryResult> {
        let pool = self.get_pool().await?;
        let started = Instant::now();

        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&pool)
            .await
            .map_err(classify)?;

        let columns = rows
            .first()
            .map(SqliteValueConverter::build_column_info)
            .unwrap_or_default();
        let rows = rows.iter().map(SqliteValueConverter::convert_row).collect();
        Ok(QueryResult::new(columns, rows, started.elapsed().as_millis()))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64> {
        let pool = self.get_pool().await?;
        let result = bind_all(sqlx::query(sql), params)
            .execute(&pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn execute_many(&self, sql: &str, batch: &[Vec<Value>]) -> DriverResult<u64> {
        let pool = self.get_pool().await?;

        let mut tx = pool.begin().await.map_err(classify)?;
        let mut affected = 0;
        for params in batch {
            match bind_all(sqlx::query(sql), params).execute(&mut *tx).await {
                Ok(result) => affected += result.rows_affected(),
                Err(err) => {
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(error = %rollback, "rollback failed");
                    }
                    return Err(classify(err));
                }
            }
        }
        tx.commit().await.map_err(classify)?;
        Ok(affected)
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(v) => query.bind(*v),
            Value::Int8(v) => query.bind(i64::from(*v)),
            Value::Int16(v) => query.bind(i64::from(*v)),
            Value::Int32(v) => query.bind(i64::from(*v)),
            Value::Int64(v) => query.bind(*v),
            Value::Float32(v) => query.bind(f64::from(*v)),
            Value::Float64(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Bytes(v) => query.bind(v.as_slice()),
            Value::Date(v) => query.bind(*v),
            Value::Time(v) => query.bind(*v),
            Value::DateTime(v) => query.bind(*v),
            Value::DateTimeTz(v) => query.bind(*v),
            Value::Uuid(v) => query.bind(*v),
            Value::Decimal(_) | Value::Json(_) | Value::Array(_) | Value::Other { .. } => {
                query.bind(value.to_string())
            }
        };
    }
    query
}

/// Converter for SQLite values to the unified `Value` type.
///
/// SQLite is dynamically typed; declared column types only hint at the
/// affinity, so decoding falls back through the storage classes.
pub struct SqliteValueConverter;

impl SqliteValueConverter {
    pub fn convert_row(row: &SqliteRow) -> Row {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name().to_uppercase();
                Self::extract_value(row, &type_name, idx)
            })
            .collect()
    }

    pub fn build_column_info(row: &SqliteRow) -> Vec<ColumnInfo> {
        row.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                ColumnInfo::new(col.name(), col.type_info().name(), idx)
            })
            .collect()
    }

    fn extract_value(row: &SqliteRow, type_name: &str, index: usize) -> Value {
        match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Err(_) => return Value::Null,
            _ => {}
        }

        match type_name {
            "INTEGER" | "INT" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT" | "INT8" => row
                .try_get::<i64, _>(index)
                .map(Value::Int64)
                .unwrap_or_else(|_| Self::decode_unknown(row, index, type_name)),
            "BOOLEAN" | "BOOL" => row
                .try_get::<bool, _>(index)
                .map(Value::Bool)
                .unwrap_or_else(|_| Self::decode_unknown(row, index, type_name)),
            "REAL" | "DOUBLE" | "FLOAT" => row
                .try_get::<f64, _>(index)
                .map(Value::Float64)
                .unwrap_or_else(|_| Self::decode_unknown(row, index, type_name)),
            "BLOB" => row
                .try_get::<Vec<u8>, _>(index)
                .map(Value::Bytes)
                .unwrap_or_else(|_| Self::decode_unknown(row, index, type_name)),
            "DATE" => Self::decode_text_as(row, index, |s| {
                chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(Value::Date)
            }),
            "DATETIME" | "TIMESTAMP" => Self::decode_text_as(row, index, |s| {
                ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                    .iter()
                    .find_map(|fmt| chrono::NaiveDateTime::parse_from_str(s, fmt).ok())
                    .map(Value::DateTime)
            }),
            "NUMERIC" | "DECIMAL" => Self::decode_text_as(row, index, |s| {
                s.parse::<rust_decimal::Decimal>().ok().map(Value::Decimal)
            }),
            _ => Self::decode_unknown(row, index, type_name),
        }
    }

    /// Parse a TEXT cell, keeping the raw text when parsing fails.
    fn decode_text_as(
        row: &SqliteRow,
        index: usize,
        parse: impl Fn(&str) -> Option<Value>,
    ) -> Value {
        match row.try_get::<String, _>(index) {
            Ok(s) => parse(&s).unwrap_or(Value::Text(s)),
            Err(_) => Self::decode_unknown(row, index, "TEXT"),
        }
    }

    fn decode_unknown(row: &SqliteRow, index: usize, type_name: &str) -> Value {
        if let Ok(v) = row.try_get::<i64, _>(index) {
            return Value::Int64(v);
        }
        if let Ok(v) = row.try_get::<f64, _>(index) {
            return Value::Float64(v);
        }
        if let Ok(v) = row.try_get::<String, _>(index) {
            return Value::Text(v);
        }
        if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
            return Value::Bytes(v);
        }
        Value::Other {
            type_name: type_name.to_string(),
            display: "<unknown>".to_string(),
        }
    }
}
