//! Core client lifecycle trait.
//!
//! Every backend client moves through the same states and exposes the same
//! lifecycle calls, so the registry can health-check and tear down clients
//! without knowing which backend they talk to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The four backends the lakehouse exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// SQL query engine (Trino)
    Query,
    /// Relational database (PostgreSQL)
    Database,
    /// Key-value cache (Redis)
    Cache,
    /// Object store (MinIO / S3)
    ObjectStore,
}

impl Backend {
    /// Stable identifier used in logs and health reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Database => "database",
            Self::Cache => "cache",
            Self::ObjectStore => "object_store",
        }
    }

    /// Name of the service backing this role in the lakehouse stack
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Query => "Trino",
            Self::Database => "PostgreSQL",
            Self::Cache => "Redis",
            Self::ObjectStore => "MinIO",
        }
    }

    /// All backends, in registry close order
    pub fn all() -> [Backend; 4] {
        [Self::Query, Self::Database, Self::Cache, Self::ObjectStore]
    }
}

/// Accepts the role name or the name of the service behind it.
impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "query" | "trino" => Ok(Self::Query),
            "database" | "postgres" | "postgresql" => Ok(Self::Database),
            "cache" | "redis" => Ok(Self::Cache),
            "object_store" | "objectstore" | "minio" | "s3" => Ok(Self::ObjectStore),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a client.
///
/// `Uninitialized -> Connected -> Closed`, or straight to `Closed`. A client
/// never returns to `Uninitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    #[default]
    Uninitialized,
    Connected,
    Closed,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

/// Uniform lifecycle surface of a backend client.
///
/// Backend operations live on the concrete client types; this trait only
/// covers what the registry needs to drive every client the same way.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// The backend this client talks to
    fn backend(&self) -> Backend;

    /// Current lifecycle state
    async fn state(&self) -> ClientState;

    /// Establish the underlying connection.
    ///
    /// Idempotent while connected. Applies the configured bounded retry and
    /// then surfaces `ClientError::Connection`.
    async fn connect(&self) -> Result<()>;

    /// Lightweight liveness check. Never fails and never opens a connection.
    async fn is_healthy(&self) -> bool;

    /// Release the underlying handle. Idempotent and safe from any state.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names() {
        assert_eq!(Backend::Query.as_str(), "query");
        assert_eq!(Backend::ObjectStore.to_string(), "object_store");
        assert_eq!(Backend::Cache.service_name(), "Redis");
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("trino".parse::<Backend>(), Ok(Backend::Query));
        assert_eq!("Postgres".parse::<Backend>(), Ok(Backend::Database));
        assert_eq!("minio".parse::<Backend>(), Ok(Backend::ObjectStore));
        assert_eq!("object_store".parse::<Backend>(), Ok(Backend::ObjectStore));
        assert!("kafka".parse::<Backend>().unwrap_err().contains("kafka"));
    }

    #[test]
    fn test_backend_serialization() {
        let json = serde_json::to_string(&Backend::ObjectStore).unwrap();
        assert_eq!(json, "\"object_store\"");
    }

    #[test]
    fn test_default_state() {
        assert_eq!(ClientState::default(), ClientState::Uninitialized);
        assert_eq!(ClientState::Closed.as_str(), "closed");
    }
}
