//! Relational database client.
//!
//! `DatabaseClient` runs parameterized SQL through a [`SqlDriver`]:
//! - `PostgresDriver`: the metastore database, over a sqlx `PgPool`
//! - `SqliteDriver`: embedded database for local runs and tests
//!
//! Parameters are bound positionally from [`Value`]s. Both drivers accept
//! `?` placeholders.

pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;

pub use postgres::PostgresDriver;
pub use sqlite::{SqliteDriver, SqliteTarget};

use crate::config::Configuration;
use crate::error::{DriverError, DriverResult, Result};
use crate::services::lifecycle::{DriverLifecycle, Lifecycle};
use crate::services::traits::{Backend, BackendClient, ClientState, QueryResult, Value};

/// Native SQL driver behind a `DatabaseClient`.
#[async_trait]
pub trait SqlDriver: DriverLifecycle {
    /// Run a read and collect its rows.
    async fn query(&self, sql: &str, params: &[Value]) -> DriverResult<QueryResult>;

    /// Run a write and return the affected-row count.
    async fn execute(&self, sql: &str, params: &[Value]) -> DriverResult<u64>;

    /// Run one statement per parameter row inside a single transaction.
    async fn execute_many(&self, sql: &str, batch: &[Vec<Value>]) -> DriverResult<u64>;
}

pub struct DatabaseClient {
    lifecycle: Lifecycle,
    driver: Box<dyn SqlDriver>,
}

impl std::fmt::Debug for DatabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseClient")
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl DatabaseClient {
    pub fn new(driver: Box<dyn SqlDriver>, config: &Configuration) -> Self {
        Self {
            lifecycle: Lifecycle::new(Backend::Database, config.retry, config.connect_timeout),
            driver,
        }
    }

    /// Client for the configured PostgreSQL database.
    pub fn postgres(config: &Configuration) -> Self {
        let driver = PostgresDriver::new(config.database.clone(), config.connect_timeout);
        Self::new(Box::new(driver), config)
    }

    /// Client over an embedded SQLite database.
    pub fn sqlite(target: SqliteTarget, config: &Configuration) -> Self {
        Self::new(Box::new(SqliteDriver::new(target)), config)
    }

    /// Run a read statement.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let _guard = self.lifecycle.acquire(self.driver.as_ref()).await?;
        tracing::debug!(backend = %Backend::Database, sql, params = params.len(), "query");
        self.driver
            .query(sql, params)
            .await
            .map_err(|e| e.into_client_error(Backend::Database))
    }

    /// Run a write statement; returns the affected-row count.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let _guard = self.lifecycle.acquire(self.driver.as_ref()).await?;
        tracing::debug!(backend = %Backend::Database, sql, params = params.len(), "execute");
        self.driver
            .execute(sql, params)
            .await
            .map_err(|e| e.into_client_error(Backend::Database))
    }

    /// Run `sql` once per parameter row, all or nothing.
    pub async fn execute_many(&self, sql: &str, batch: &[Vec<Value>]) -> Result<u64> {
        let _guard = self.lifecycle.acquire(self.driver.as_ref()).await?;
        tracing::debug!(backend = %Backend::Database, sql, rows = batch.len(), "execute_many");
        self.driver
            .execute_many(sql, batch)
            .await
            .map_err(|e| e.into_client_error(Backend::Database))
    }
}

#[async_trait]
impl BackendClient for DatabaseClient {
    fn backend(&self) -> Backend {
        Backend::Database
    }

    async fn state(&self) -> ClientState {
        self.lifecycle.state().await
    }

    async fn connect(&self) -> Result<()> {
        self.lifecycle.connect(self.driver.as_ref()).await
    }

    async fn is_healthy(&self) -> bool {
        self.lifecycle.check_health(self.driver.as_ref()).await
    }

    async fn close(&self) -> Result<()> {
        self.lifecycle.close(self.driver.as_ref()).await
    }
}

/// Split sqlx failures into transport problems and rejected statements.
pub(crate) fn classify(err: sqlx::Error) -> DriverError {
    let is_connection = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        // SQLSTATE 28xxx: invalid authorization, 3D000: unknown database
        sqlx::Error::Database(db) => db.code().is_some_and(|code| {
            code.len() == 5 && (code.starts_with("28") || code == "3D000")
        }),
        _ => false,
    };

    if is_connection {
        DriverError::connection(err)
    } else {
        DriverError::operation(err)
    }
}
