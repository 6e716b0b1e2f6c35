//! Client factory.
//!
//! The registry never builds clients itself; it asks a [`ClientFactory`],
//! so local runs and tests can swap in embedded or in-process backends.

use std::path::PathBuf;

use super::cache::CacheClient;
use super::database::{DatabaseClient, SqliteTarget};
use super::query::QueryClient;
use super::storage::ObjectStoreClient;
use crate::config::Configuration;

/// Builds one unconnected client per backend.
pub trait ClientFactory: Send + Sync {
    fn query(&self, config: &Configuration) -> QueryClient;

    fn database(&self, config: &Configuration) -> DatabaseClient;

    fn cache(&self, config: &Configuration) -> CacheClient;

    fn object_store(&self, config: &Configuration) -> ObjectStoreClient;
}

/// Production backends: Trino, PostgreSQL, Redis and MinIO.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendFactory;

impl ClientFactory for BackendFactory {
    fn query(&self, config: &Configuration) -> QueryClient {
        QueryClient::trino(config)
    }

    fn database(&self, config: &Configuration) -> DatabaseClient {
        DatabaseClient::postgres(config)
    }

    fn cache(&self, config: &Configuration) -> CacheClient {
        CacheClient::redis(config)
    }

    fn object_store(&self, config: &Configuration) -> ObjectStoreClient {
        ObjectStoreClient::minio(config)
    }
}

/// Everything except the query engine runs in-process: SQLite, an in-memory
/// cache and a directory standing in for the bucket.
#[derive(Debug, Clone)]
pub struct LocalFactory {
    pub database: SqliteTarget,
    pub storage_root: PathBuf,
}

impl LocalFactory {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            database: SqliteTarget::Memory,
            storage_root: storage_root.into(),
        }
    }

    pub fn with_database(mut self, target: SqliteTarget) -> Self {
        self.database = target;
        self
    }
}

impl ClientFactory for LocalFactory {
    fn query(&self, config: &Configuration) -> QueryClient {
        QueryClient::trino(config)
    }

    fn database(&self, config: &Configuration) -> DatabaseClient {
        DatabaseClient::sqlite(self.database.clone(), config)
    }

    fn cache(&self, config: &Configuration) -> CacheClient {
        CacheClient::memory(config)
    }

    fn object_store(&self, config: &Configuration) -> ObjectStoreClient {
        ObjectStoreClient::local(&self.storage_root, config)
    }
}
