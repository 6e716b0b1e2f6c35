//! Query engine client (Trino).
//!
//! `QueryClient` owns one [`QueryEngine`] and drives it through the shared
//! lifecycle. The production engine speaks the Trino HTTP protocol.

pub mod trino;
pub mod types;

use std::collections::BTreeMap;

use anyhow::anyhow;
use async_trait::async_trait;

pub use trino::TrinoEngine;

use crate::config::Configuration;
use crate::error::{ClientError, DriverResult, Result};
use crate::services::lifecycle::{DriverLifecycle, Lifecycle};
use crate::services::traits::{Backend, BackendClient, ClientState, QueryResult, Value};

/// Native SQL engine behind a `QueryClient`.
#[async_trait]
pub trait QueryEngine: DriverLifecycle {
    /// Run one statement to completion and collect every row.
    async fn execute(&self, sql: &str) -> DriverResult<QueryResult>;
}

pub struct QueryClient {
    lifecycle: Lifecycle,
    engine: Box<dyn QueryEngine>,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl QueryClient {
    pub fn new(engine: Box<dyn QueryEngine>, config: &Configuration) -> Self {
        Self {
            lifecycle: Lifecycle::new(Backend::Query, config.retry, config.connect_timeout),
            engine,
        }
    }

    /// Client for the configured Trino coordinator.
    pub fn trino(config: &Configuration) -> Self {
        let engine = TrinoEngine::new(config.query.clone(), config.connect_timeout);
        Self::new(Box::new(engine), config)
    }

    /// Execute a statement and return its rows in server order.
    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let _guard = self.lifecycle.acquire(self.engine.as_ref()).await?;
        tracing::debug!(backend = %Backend::Query, sql, "executing statement");
        self.engine
            .execute(sql)
            .await
            .map_err(|e| e.into_client_error(Backend::Query))
    }

    /// Table names in the session schema.
    pub async fn show_tables(&self) -> Result<Vec<String>> {
        let result = self.execute("SHOW TABLES").await?;
        Ok(result
            .first_column()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }

    /// Column descriptions of `table`, one record per column.
    pub async fn describe_table(&self, table: &str) -> Result<Vec<BTreeMap<String, Value>>> {
        if !is_table_reference(table) {
            return Err(ClientError::Operation {
                backend: Backend::Query,
                source: anyhow!("invalid table name `{}`", table),
            });
        }
        let result = self.execute(&format!("DESCRIBE {}", table)).await?;
        Ok(result.records())
    }
}

/// `table`, `schema.table` or `catalog.schema.table` of plain identifiers.
fn is_table_reference(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 3
        && parts.iter().all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[async_trait]
impl BackendClient for QueryClient {
    fn backend(&self) -> Backend {
        Backend::Query
    }

    async fn state(&self) -> ClientState {
        self.lifecycle.state().await
    }

    async fn connect(&self) -> Result<()> {
        self.lifecycle.connect(self.engine.as_ref()).await
    }

    async fn is_healthy(&self) -> bool {
        self.lifecycle.check_health(self.engine.as_ref()).await
    }

    async fn close(&self) -> Result<()> {
        self.lifecycle.close(self.engine.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_reference_validation() {
        assert!(is_table_reference("orders"));
        assert!(is_table_reference("iceberg.sales.orders"));
        assert!(!is_table_reference("orders; DROP TABLE x"));
        assert!(!is_table_reference("a.b.c.d"));
        assert!(!is_table_reference(""));
    }
}
