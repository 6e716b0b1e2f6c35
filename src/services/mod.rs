//! Backend clients and the registry that owns them.
//!
//! - **Traits** (`traits`): lifecycle trait, backend ids, tabular values
//! - **Clients** (`query`, `database`, `cache`, `storage`): one per backend
//! - **Registry** (`registry`, `factory`, `health`): lazy construction,
//!   health aggregation, teardown
//! - **Scope** (`scope`): run a body with a registry that is always torn down

pub mod cache;
pub mod database;
pub mod factory;
pub mod health;
pub mod lifecycle;
pub mod query;
pub mod registry;
pub mod scope;
pub mod storage;
pub mod traits;

pub use cache::{CacheClient, CacheDriver, CacheLookup, MemoryCache, RedisDriver};
pub use database::{DatabaseClient, PostgresDriver, SqlDriver, SqliteDriver, SqliteTarget};
pub use factory::{BackendFactory, ClientFactory, LocalFactory};
pub use health::{HealthReport, HealthStatus};
pub use lifecycle::DriverLifecycle;
pub use query::{QueryClient, QueryEngine, TrinoEngine};
pub use registry::ClientRegistry;
pub use scope::{ClientScope, ScopePolicy, with_clients};
pub use storage::{ObjectInfo, ObjectStoreClient, StorageParams, StorageType};
pub use traits::{Backend, BackendClient, ClientState, QueryResult, Row, Value};
