//! PostgreSQL driver.
//!
//! Wraps a sqlx `PgPool` and converts result rows to the unified `Value`
//! type by PostgreSQL type name.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgPoolOptions, PgRow, PgTypeInfo,
};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo, ValueRef};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SqlDriver, classify};
use crate::config::DatabaseSettings;
use crate::error::{DriverError, DriverResult};
use crate::services::lifecycle::DriverLifecycle;
use crate::services::traits::{ColumnInfo, QueryResult, Row, Value};

const MAX_CONNECTIONS: u32 = 5;

pub struct PostgresDriver {
    settings: DatabaseSettings,
    connect_timeout: Duration,
    pool: RwLock<Option<PgPool>>,
}

impl std::fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("url", &self.settings.display_url())
            .field("pool", &"<PgPool>")
            .finish()
    }
}

impl PostgresDriver {
    /// Does not connect; the pool is built on `open`.
    pub fn new(settings: DatabaseSettings, connect_timeout: Duration) -> Self {
        Self {
            settings,
            connect_timeout,
            pool: RwLock::new(None),
        }
    }

    fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.settings.host)
            .port(self.settings.port)
            .username(&self.settings.user)
            .password(self.settings.password.expose())
            .database(&self.settings.database)
    }

    async fn get_pool(&self) -> DriverResult<PgPool> {
        self.pool
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or_else(|| DriverError::connection(anyhow!("PostgreSQL pool not connected")))
    }
}

#[async_trait]
impl DriverLifecycle for PostgresDriver {
    async fn open(&self) -> DriverResult<()> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(self.connect_timeout)
            .connect_with(self.connect_options())
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
impl SqlDriver for PostgresDriver {
    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<QueryResult> {
        let pool = self.get_pool().await?;
        let started = Instant::now();
        let sql = rewrite_placeholders(sql);

        let rows = bind_all(sqlx::query(&sql), params)
            .fetch_all(&pool)
            .await
            .map_err(classify)?;

        let columns = rows.first().map(PgValueConverter::build_column_info).unwrap_or_default();
        let rows = rows.iter().map(PgValueConverter::convert_row).collect();
        Ok(QueryResult::new(columns, rows, started.elapsed().as_millis()))
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64> {
        let pool = self.get_pool().await?;
        let sql = rewrite_placeholders(sql);

        let result = bind_all(sqlx::query(&sql), params)
            .execute(&pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn execute_many(&self, sql: &str, batch: &[Vec<Value>]) -> DriverResult<u64> {
        let pool = self.get_pool().await?;
        let sql = rewrite_placeholders(sql);

        let mut tx = pool.begin().await.map_err(classify)?;
        let mut affected = 0;
        for params in batch {
            match bind_all(sqlx::query(&sql), params).execute(&mut *tx).await {
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
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in params {
        query = bind_value(query, value);
    }
    query
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(UntypedNull),
        Value::Bool(v) => query.bind(*v),
        Value::Int8(v) => query.bind(i16::from(*v)),
        Value::Int16(v) => query.bind(*v),
        Value::Int32(v) => query.bind(*v),
        Value::Int64(v) => query.bind(*v),
        Value::Float32(v) => query.bind(*v),
        Value::Float64(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::DateTimeTz(v) => query.bind(*v),
        Value::Decimal(v) => query.bind(*v),
        Value::Uuid(v) => query.bind(*v),
        Value::Json(v) => query.bind(sqlx::types::Json(v)),
        Value::Array(_) | Value::Other { .. } => query.bind(value.to_string()),
    }
}

/// Rewrite `?` placeholders to `$1..$n`.
///
/// Quoted literals and identifiers, `--` and `/* */` comments and
/// dollar-quoted bodies are copied untouched. SQL that already uses `$n`
/// outside those is returned as is.
pub fn rewrite_placeholders(sql: &str) -> Cow<'_, str> {
    if !sql.contains('?') {
        return Cow::Borrowed(sql);
    }

    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let end = match c {
            '\'' | '"' => closing_quote(&chars, i + 1, c),
            '-' if next == Some('-') => line_end(&chars, i + 2),
            '/' if next == Some('*') => block_comment_end(&chars, i + 2),
            '$' if is_identifier_char(i.checked_sub(1).map(|p| chars[p])) => i + 1,
            '$' if next.is_some_and(|d| d.is_ascii_digit()) => return Cow::Borrowed(sql),
            '$' => dollar_quote_end(&chars, i).unwrap_or(i + 1),
            '?' => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
                i += 1;
                continue;
            }
            _ => i + 1,
        };
        out.extend(&chars[i..end]);
        i = end;
    }
    Cow::Owned(out)
}

fn is_identifier_char(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_alphanumeric() || c == '_')
}

/// Index just past the quote closing a literal opened before `from`.
/// A doubled quote closes and reopens, which copies the same text.
fn closing_quote(chars: &[char], from: usize, quote: char) -> usize {
    chars[from..]
        .iter()
        .position(|&c| c == quote)
        .map_or(chars.len(), |p| from + p + 1)
}

fn line_end(chars: &[char], from: usize) -> usize {
    chars[from..]
        .iter()
        .position(|&c| c == '\n')
        .map_or(chars.len(), |p| from + p)
}

/// Block comments nest in PostgreSQL.
fn block_comment_end(chars: &[char], from: usize) -> usize {
    let mut depth = 1;
    let mut i = from;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1).copied()) {
            ('/', Some('*')) => {
                depth += 1;
                i += 2;
            }
            ('*', Some('/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// End of a `$tag$ ... $tag$` body starting at `start`, if one opens there.
fn dollar_quote_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    while j < chars.len() && is_identifier_char(Some(chars[j])) {
        j += 1;
    }
    if chars.get(j) != Some(&'$') {
        return None;
    }

    let tag = &chars[start..=j];
    let body = j + 1;
    let end = chars[body..]
        .windows(tag.len())
        .position(|w| w == tag)
        .map_or(chars.len(), |p| body + p + tag.len());
    Some(end)
}

/// NULL with no declared type, so the server infers it from the statement.
#[derive(Debug, Clone, Copy)]
struct UntypedNull;

impl sqlx::Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl sqlx::Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Converter for PostgreSQL values to the unified `Value` type.
pub struct PgValueConverter;

impl PgValueConverter {
    pub fn convert_row(pg_row: &PgRow) -> Row {
        pg_row
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| Self::extract_value(pg_row, col.type_info().name(), idx))
            .collect()
    }

    pub fn build_column_info(pg_row: &PgRow) -> Vec<ColumnInfo> {
        pg_row
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                ColumnInfo::new(col.name(), col.type_info().name(), idx)
            })
            .collect()
    }

    fn extract_value(row: &PgRow, type_name: &str, index: usize) -> Value {
        match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Err(_) => return Value::Null,
            _ => {}
        }
        Self::decode_by_type(row, index, type_name)
    }

    fn decode_by_type(row: &PgRow, index: usize, type_name: &str) -> Value {
        let decoded = match type_name {
            "BOOL" => row.try_get::<bool, _>(index).map(Value::Bool),
            "INT2" => row.try_get::<i16, _>(index).map(Value::Int16),
            "INT4" => row.try_get::<i32, _>(index).map(Value::Int32),
            "INT8" => row.try_get::<i64, _>(index).map(Value::Int64),
            "FLOAT4" => row.try_get::<f32, _>(index).map(Value::Float32),
            "FLOAT8" => row.try_get::<f64, _>(index).map(Value::Float64),
            "NUMERIC" => row.try_get::<Decimal, _>(index).map(Value::Decimal),
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => {
                row.try_get::<String, _>(index).map(Value::Text)
            }
            "BYTEA" => row.try_get::<Vec<u8>, _>(index).map(Value::Bytes),
            "DATE" => row.try_get::<NaiveDate, _>(index).map(Value::Date),
            "TIME" => row.try_get::<NaiveTime, _>(index).map(Value::Time),
            "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(index).map(Value::DateTime),
            "TIMESTAMPTZ" => row.try_get::<DateTime<Utc>, _>(index).map(Value::DateTimeTz),
            "UUID" => row.try_get::<Uuid, _>(index).map(Value::Uuid),
            "JSON" | "JSONB" => row.try_get::<serde_json::Value, _>(index).map(Value::Json),
            "INT4[]" => row
                .try_get::<Vec<i32>, _>(index)
                .map(|arr| Value::Array(arr.into_iter().map(Value::Int32).collect())),
            "INT8[]" => row
                .try_get::<Vec<i64>, _>(index)
                .map(|arr| Value::Array(arr.into_iter().map(Value::Int64).collect())),
            "TEXT[]" | "VARCHAR[]" => row
                .try_get::<Vec<String>, _>(index)
                .map(|arr| Value::Array(arr.into_iter().map(Value::Text).collect())),
            _ => return Self::decode_fallback(row, index, type_name),
        };
        decoded.unwrap_or_else(|_| Self::decode_fallback(row, index, type_name))
    }

    fn decode_fallback(row: &PgRow, index: usize, type_name: &str) -> Value {
        let display = row
            .try_get::<String, _>(index)
            .unwrap_or_else(|_| "<unknown>".to_string());
        Value::Other {
            type_name: type_name.to_string(),
            display,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_placeholders() {
        assert_eq!(
            rewrite_placeholders("INSERT INTO t (a, b) VALUES (?, ?)"),
            "INSERT INTO t (a, b) VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_rewrite_skips_quoted_text() {
        assert_eq!(
            rewrite_placeholders("SELECT '?' AS q, \"col?\" FROM t WHERE id = ?"),
            "SELECT '?' AS q, \"col?\" FROM t WHERE id = $1"
        );
    }

    #[test]
    fn test_rewrite_leaves_numbered_sql() {
        let sql = "SELECT * FROM t WHERE a = $1 AND b = '?'";
        assert!(matches!(rewrite_placeholders(sql), Cow::Borrowed(_)));
    }

    #[test]
    fn test_rewrite_ignores_dollar_digits_in_literals() {
        assert_eq!(
            rewrite_placeholders("SELECT '$1 off' AS promo FROM t WHERE id = ?"),
            "SELECT '$1 off' AS promo FROM t WHERE id = $1"
        );
    }

    #[test]
    fn test_rewrite_skips_comments() {
        assert_eq!(
            rewrite_placeholders("-- why?\nINSERT INTO t (x) VALUES (?)"),
            "-- why?\nINSERT INTO t (x) VALUES ($1)"
        );
        assert_eq!(
            rewrite_placeholders("SELECT /* a? /* nested? */ b? */ x FROM t WHERE y = ?"),
            "SELECT /* a? /* nested? */ b? */ x FROM t WHERE y = $1"
        );
    }

    #[test]
    fn test_rewrite_skips_dollar_quoted_bodies() {
        assert_eq!(
            rewrite_placeholders("SELECT $fn$ what? $1 $fn$, $$ ok? $$, col$x FROM t WHERE a = ?"),
            "SELECT $fn$ what? $1 $fn$, $$ ok? $$, col$x FROM t WHERE a = $1"
        );
    }

    #[test]
    fn test_rewrite_handles_doubled_quotes() {
        assert_eq!(
            rewrite_placeholders("INSERT INTO t (a, b) VALUES ('it''s?', ?)"),
            "INSERT INTO t (a, b) VALUES ('it''s?', $1)"
        );
    }

    #[test]
    fn test_null_is_sent_without_a_type() {
        assert_eq!(<UntypedNull as sqlx::Type<Postgres>>::type_info().oid(), Some(Oid(0)));

        let mut buf = PgArgumentBuffer::default();
        let encoded =
            <UntypedNull as sqlx::Encode<'_, Postgres>>::encode_by_ref(&UntypedNull, &mut buf)
                .unwrap();
        assert!(matches!(encoded, IsNull::Yes));
    }
}
