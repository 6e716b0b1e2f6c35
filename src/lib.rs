//! Unified client layer for a lakehouse stack.
//!
//! One registry hands out lazily connected clients for the query engine
//! (Trino), the relational database (PostgreSQL), the cache (Redis) and the
//! object store (MinIO), with aggregated health checks and deterministic
//! teardown.
//!
//! ```no_run
//! use std::sync::Arc;
//! use lakehouse_clients::{ClientError, Configuration, with_clients};
//!
//! # async fn run() -> Result<(), ClientError> {
//! let config = Arc::new(Configuration::load()?);
//! let tables = with_clients(config, |clients| async move {
//!     clients.query().await?.show_tables().await
//! })
//! .await?;
//! println!("{tables:?}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod services;

pub use config::Configuration;
pub use error::{ClientError, ConfigError, DriverError, Result, TeardownError};
pub use services::{
    Backend, BackendClient, CacheClient, CacheLookup, ClientRegistry, ClientScope, ClientState,
    DatabaseClient, HealthReport, HealthStatus, ObjectStoreClient, QueryClient, QueryResult,
    ScopePolicy, Value, with_clients,
};
