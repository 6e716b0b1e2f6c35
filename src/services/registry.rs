//! Client registry.
//!
//! Holds at most one live client per backend. Clients are built lazily on
//! first access and connected before being handed out; later accesses return
//! the same `Arc`. Each backend has its own async mutex around the
//! check-and-construct step, so concurrent first accesses build one client.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::cache::CacheClient;
use super::database::DatabaseClient;
use super::factory::{BackendFactory, ClientFactory};
use super::health::{HealthReport, HealthStatus};
use super::query::QueryClient;
use super::storage::ObjectStoreClient;
use super::traits::{Backend, BackendClient};
use crate::config::Configuration;
use crate::error::{ClientError, Result, TeardownError};

type Slot<C> = Mutex<Option<Arc<C>>>;

pub struct ClientRegistry {
    config: Arc<Configuration>,
    factory: Arc<dyn ClientFactory>,
    query: Slot<QueryClient>,
    database: Slot<DatabaseClient>,
    cache: Slot<CacheClient>,
    object_store: Slot<ObjectStoreClient>,
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("app_name", &self.config.app_name)
            .finish_non_exhaustive()
    }
}

/// Return the cached client or build, connect and cache a new one.
async fn get_or_connect<C>(slot: &Slot<C>, build: impl FnOnce() -> C) -> Result<Arc<C>>
where
    C: BackendClient,
{
    let mut guard = slot.lock().await;
    if let Some(client) = guard.as_ref() {
        return Ok(Arc::clone(client));
    }

    let client = Arc::new(build());
    tracing::debug!(backend = %client.backend(), "initializing client");
    client.connect().await?;
    *guard = Some(Arc::clone(&client));
    Ok(client)
}

async fn peek<C>(slot: &Slot<C>) -> Option<Arc<dyn BackendClient>>
where
    C: BackendClient + 'static,
{
    slot.lock()
        .await
        .as_ref()
        .map(|c| Arc::clone(c) as Arc<dyn BackendClient>)
}

async fn take<C>(slot: &Slot<C>) -> Option<Arc<dyn BackendClient>>
where
    C: BackendClient + 'static,
{
    slot.lock()
        .await
        .take()
        .map(|c| c as Arc<dyn BackendClient>)
}

impl ClientRegistry {
    /// Registry over the production backends.
    pub fn new(config: Arc<Configuration>) -> Self {
        Self::with_factory(config, Arc::new(BackendFactory))
    }

    pub fn with_factory(config: Arc<Configuration>, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            config,
            factory,
            query: Mutex::new(None),
            database: Mutex::new(None),
            cache: Mutex::new(None),
            object_store: Mutex::new(None),
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    pub async fn query(&self) -> Result<Arc<QueryClient>> {
        get_or_connect(&self.query, || self.factory.query(&self.config)).await
    }

    pub async fn database(&self) -> Result<Arc<DatabaseClient>> {
        get_or_connect(&self.database, || self.factory.database(&self.config)).await
    }

    pub async fn cache(&self) -> Result<Arc<CacheClient>> {
        get_or_connect(&self.cache, || self.factory.cache(&self.config)).await
    }

    pub async fn object_store(&self) -> Result<Arc<ObjectStoreClient>> {
        get_or_connect(&self.object_store, || self.factory.object_store(&self.config)).await
    }

    /// Touch every accessor, returning the failures instead of stopping at
    /// the first one.
    pub async fn connect_all(&self) -> Vec<ClientError> {
        let mut failures = Vec::new();
        for backend in Backend::all() {
            let outcome = match backend {
                Backend::Query => self.query().await.map(|_| ()),
                Backend::Database => self.database().await.map(|_| ()),
                Backend::Cache => self.cache().await.map(|_| ()),
                Backend::ObjectStore => self.object_store().await.map(|_| ()),
            };
            if let Err(err) = outcome {
                tracing::warn!(%backend, error = %err, "client unavailable");
                failures.push(err);
            }
        }
        failures
    }

    pub async fn is_initialized(&self, backend: Backend) -> bool {
        self.client(backend).await.is_some()
    }

    async fn client(&self, backend: Backend) -> Option<Arc<dyn BackendClient>> {
        match backend {
            Backend::Query => peek(&self.query).await,
            Backend::Database => peek(&self.database).await,
            Backend::Cache => peek(&self.cache).await,
            Backend::ObjectStore => peek(&self.object_store).await,
        }
    }

    /// Ping every constructed client. Never builds a client and never fails.
    pub async fn health_check(&self) -> HealthReport {
        let mut report = HealthReport::new();
        for backend in Backend::all() {
            let Some(client) = self.client(backend).await else {
                continue;
            };
            let status = if client.is_healthy().await {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            };
            report.set(backend, status);
        }
        tracing::info!(healthy = report.all_healthy(), "health check finished");
        report
    }

    /// Close every constructed client in a fixed order.
    ///
    /// A failing close does not stop the others. Closed clients are removed,
    /// so a later accessor call builds a fresh one.
    pub async fn close_all(&self) -> std::result::Result<(), TeardownError> {
        let mut failures = Vec::new();
        for backend in Backend::all() {
            let client = match backend {
                Backend::Query => take(&self.query).await,
                Backend::Database => take(&self.database).await,
                Backend::Cache => take(&self.cache).await,
                Backend::ObjectStore => take(&self.object_store).await,
            };
            let Some(client) = client else {
                continue;
            };
            if let Err(err) = client.close().await {
                failures.push(err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            let err = TeardownError::new(failures);
            tracing::error!(backends = ?err.backends(), "teardown finished with failures");
            Err(err)
        }
    }
}

impl Drop for ClientRegistry {
    fn drop(&mut self) {
        let live: Vec<&str> = [
            self.query.get_mut().is_some(),
            self.database.get_mut().is_some(),
            self.cache.get_mut().is_some(),
            self.object_store.get_mut().is_some(),
        ]
        .into_iter()
        .zip(Backend::all())
        .filter(|(live, _)| *live)
        .map(|(_, backend)| backend.as_str())
        .collect();

        if !live.is_empty() {
            tracing::warn!(?live, "client registry dropped without close_all");
        }
    }
}
