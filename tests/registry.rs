mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use lakehouse_clients::error::{DriverError, DriverResult};
use lakehouse_clients::services::{CacheDriver, ClientFactory, DriverLifecycle, LocalFactory};
use lakehouse_clients::{
    Backend, BackendClient, CacheClient, CacheLookup, ClientRegistry, ClientState, ConfigError,
    Configuration, DatabaseClient, HealthStatus, ObjectStoreClient, QueryClient, Value,
};
use tempfile::TempDir;

fn local_registry() -> (ClientRegistry, TempDir) {
    let dir = TempDir::new().unwrap();
    let factory = Arc::new(LocalFactory::new(dir.path()));
    let registry = ClientRegistry::with_factory(common::test_config(), factory);
    (registry, dir)
}

/// Cache double whose ping or close can be made to fail.
struct FaultyCache {
    fail_ping: bool,
    fail_release: bool,
}

#[async_trait]
impl DriverLifecycle for FaultyCache {
    async fn open(&self) -> DriverResult<()> {
        Ok(())
    }

    async fn ping(&self) -> DriverResult<()> {
        if self.fail_ping {
            return Err(DriverError::connection(anyhow!("PING went unanswered")));
        }
        Ok(())
    }

    async fn release(&self) -> DriverResult<()> {
        if self.fail_release {
            return Err(DriverError::connection(anyhow!("connection reset while quitting")));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheDriver for FaultyCache {
    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> DriverResult<()> {
        Ok(())
    }

    async fn get(&self, _key: &str) -> DriverResult<Option<String>> {
        Ok(None)
    }

    async fn delete(&self, _key: &str) -> DriverResult<bool> {
        Ok(false)
    }

    async fn exists(&self, _key: &str) -> DriverResult<bool> {
        Ok(false)
    }
}

/// Local backends, except for a faulty cache.
struct FaultyCacheFactory {
    local: LocalFactory,
    fail_ping: bool,
    fail_release: bool,
}

impl FaultyCacheFactory {
    fn new(root: &std::path::Path) -> Self {
        Self {
            local: LocalFactory::new(root),
            fail_ping: false,
            fail_release: false,
        }
    }
}

impl ClientFactory for FaultyCacheFactory {
    fn query(&self, config: &Configuration) -> QueryClient {
        self.local.query(config)
    }

    fn database(&self, config: &Configuration) -> DatabaseClient {
        self.local.database(config)
    }

    fn cache(&self, config: &Configuration) -> CacheClient {
        let driver = FaultyCache {
            fail_ping: self.fail_ping,
            fail_release: self.fail_release,
        };
        CacheClient::new(Box::new(driver), config)
    }

    fn object_store(&self, config: &Configuration) -> ObjectStoreClient {
        self.local.object_store(config)
    }
}

#[tokio::test]
async fn accessor_returns_same_client() {
    let (registry, _dir) = local_registry();

    let first = registry.cache().await.unwrap();
    let second = registry.cache().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let db_first = registry.database().await.unwrap();
    let db_second = registry.database().await.unwrap();
    assert!(Arc::ptr_eq(&db_first, &db_second));

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn concurrent_first_access_builds_one_client() {
    let (registry, _dir) = local_registry();
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.cache().await.unwrap() })
        })
        .collect();

    let mut clients = Vec::new();
    for handle in handles {
        clients.push(handle.await.unwrap());
    }
    assert!(clients.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn close_all_on_empty_registry_is_noop() {
    let registry = ClientRegistry::new(common::test_config());
    registry.close_all().await.unwrap();
    registry.close_all().await.unwrap();

    for backend in Backend::all() {
        assert!(!registry.is_initialized(backend).await);
    }
}

#[tokio::test]
async fn health_check_does_not_construct_clients() {
    let registry = ClientRegistry::new(common::test_config());

    let report = registry.health_check().await;
    for backend in Backend::all() {
        assert_eq!(report.status(backend), HealthStatus::NotInitialized);
        assert!(!registry.is_initialized(backend).await);
    }
    assert!(!report.all_healthy());
}

#[tokio::test]
async fn health_check_reports_constructed_clients() {
    let (registry, _dir) = local_registry();

    let failures = registry.connect_all().await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].backend(), Some(Backend::Query));
    assert!(failures[0].is_connection());

    let report = registry.health_check().await;
    assert_eq!(report.status(Backend::Query), HealthStatus::NotInitialized);
    assert_eq!(report.status(Backend::Database), HealthStatus::Healthy);
    assert_eq!(report.status(Backend::Cache), HealthStatus::Healthy);
    assert_eq!(report.status(Backend::ObjectStore), HealthStatus::Healthy);
    assert_eq!(report.failing(), vec![Backend::Query]);

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn health_check_with_only_cache_constructed() {
    let (registry, _dir) = local_registry();
    registry.cache().await.unwrap();

    let report = registry.health_check().await;
    assert_eq!(report.status(Backend::Cache), HealthStatus::Healthy);
    for backend in [Backend::Query, Backend::Database, Backend::ObjectStore] {
        assert_eq!(report.status(backend), HealthStatus::NotInitialized);
        assert!(!registry.is_initialized(backend).await);
    }
    assert!(!report.all_healthy());

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn failing_ping_is_unhealthy_not_uninitialized() {
    let dir = TempDir::new().unwrap();
    let factory = FaultyCacheFactory {
        fail_ping: true,
        ..FaultyCacheFactory::new(dir.path())
    };
    let registry = ClientRegistry::with_factory(common::test_config(), Arc::new(factory));

    let cache = registry.cache().await.unwrap();
    assert_eq!(cache.state().await, ClientState::Connected);

    let report = registry.health_check().await;
    assert_eq!(report.status(Backend::Cache), HealthStatus::Unhealthy);
    for backend in [Backend::Query, Backend::Database, Backend::ObjectStore] {
        assert_eq!(report.status(backend), HealthStatus::NotInitialized);
    }
    assert_eq!(report.failing().len(), 4);

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn failed_connect_is_not_cached() {
    let registry = ClientRegistry::new(common::test_config());

    let err = registry.query().await.unwrap_err();
    assert!(err.is_connection());
    assert_eq!(err.backend(), Some(Backend::Query));
    assert!(!registry.is_initialized(Backend::Query).await);
}

#[tokio::test]
async fn close_failure_does_not_stop_other_closes() {
    let dir = TempDir::new().unwrap();
    let factory = FaultyCacheFactory {
        fail_release: true,
        ..FaultyCacheFactory::new(dir.path())
    };
    let registry = ClientRegistry::with_factory(common::test_config(), Arc::new(factory));

    let database = registry.database().await.unwrap();
    let cache = registry.cache().await.unwrap();
    let store = registry.object_store().await.unwrap();

    let err = registry.close_all().await.unwrap_err();
    assert_eq!(err.backends(), vec![Backend::Cache]);
    assert_eq!(err.failures().len(), 1);

    assert_eq!(database.state().await, ClientState::Closed);
    assert_eq!(cache.state().await, ClientState::Closed);
    assert_eq!(store.state().await, ClientState::Closed);
    for backend in Backend::all() {
        assert!(!registry.is_initialized(backend).await);
    }
}

#[tokio::test]
async fn accessor_after_close_all_builds_new_client() {
    let (registry, _dir) = local_registry();

    let before = registry.cache().await.unwrap();
    registry.close_all().await.unwrap();
    assert!(before.get("k").await.unwrap_err().is_closed());

    let after = registry.cache().await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.state().await, ClientState::Connected);

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn cache_distinguishes_absent_keys() {
    let (registry, _dir) = local_registry();
    let cache = registry.cache().await.unwrap();

    assert_eq!(cache.get("nonexistent_key").await.unwrap(), CacheLookup::Absent);

    cache.set("empty", "", None).await.unwrap();
    assert_eq!(cache.get("empty").await.unwrap(), CacheLookup::Hit(String::new()));

    cache.set("forever", "v", Some(Duration::ZERO)).await.unwrap();
    cache.set("short", "v", Some(Duration::from_millis(20))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.get("short").await.unwrap(), CacheLookup::Absent);
    assert_eq!(cache.get("forever").await.unwrap(), CacheLookup::Hit("v".to_string()));

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn database_insert_reports_affected_rows() {
    let (registry, _dir) = local_registry();
    let db = registry.database().await.unwrap();

    db.execute("CREATE TABLE t (x TEXT)", &[]).await.unwrap();
    let affected = db
        .execute("INSERT INTO t (x) VALUES (?)", &[Value::from("a")])
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let result = db.query("SELECT x FROM t", &[]).await.unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0].get_value(0), Some(&Value::Text("a".to_string())));

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn database_error_is_operation_error() {
    let (registry, _dir) = local_registry();
    let db = registry.database().await.unwrap();

    let err = db.query("SELECT * FROM missing_table", &[]).await.unwrap_err();
    assert!(err.is_operation());
    assert_eq!(err.backend(), Some(Backend::Database));

    registry.close_all().await.unwrap();
}

#[test]
fn missing_trino_host_fails_before_any_client() {
    let mut env = common::base_env();
    env.remove("TRINO_HOST");

    let err = Configuration::from_lookup(|name| env.get(name).cloned()).unwrap_err();
    assert_eq!(
        err,
        ConfigError::Missing {
            name: "TRINO_HOST".to_string()
        }
    );
    assert!(err.to_string().contains("TRINO_HOST"));
}
