//! Object store client.
//!
//! Transfers whole files between the local filesystem and a bucket. Buckets
//! are provisioned externally; connecting to a missing bucket fails with
//! `NotFound` instead of creating it.

use std::path::Path;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use opendal::{EntryMode, Operator};
use tokio::sync::RwLock;

use super::factory::{StorageFactory, classify};
use super::types::{ObjectInfo, StorageParams, StorageType};
use crate::config::Configuration;
use crate::error::{ClientError, DriverError, DriverResult, Result};
use crate::services::lifecycle::{DriverLifecycle, Lifecycle};
use crate::services::traits::{Backend, BackendClient, ClientState};

/// Owns the OpenDAL operator for one bucket.
#[derive(Debug)]
pub struct OperatorDriver {
    params: StorageParams,
    operator: RwLock<Option<Operator>>,
}

impl OperatorDriver {
    pub fn new(params: StorageParams) -> Self {
        Self {
            params,
            operator: RwLock::new(None),
        }
    }

    async fn get_operator(&self) -> DriverResult<Operator> {
        self.operator
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or_else(|| DriverError::connection(anyhow!("object store not connected")))
    }

    async fn check(&self, op: &Operator) -> DriverResult<()> {
        op.check()
            .await
            .map_err(|e| classify(e, &self.params.container()))
    }
}

#[async_trait]
impl DriverLifecycle for OperatorDriver {
    async fn open(&self) -> DriverResult<()> {
        let op = StorageFactory::build_operator(&self.params)?;
        self.check(&op).await?;
        *self.operator.write().await = Some(op);
        Ok(())
    }

    async fn ping(&self) -> DriverResult<()> {
        let op = self.get_operator().await?;
        self.check(&op).await
    }

    async fn release(&self) -> DriverResult<()> {
        self.operator.write().await.take();
        Ok(())
    }
}

/// Keys never start with `/`.
fn normalize_key(key: &str) -> &str {
    key.trim_start_matches('/')
}

pub struct ObjectStoreClient {
    lifecycle: Lifecycle,
    driver: OperatorDriver,
}

impl std::fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("lifecycle", &self.lifecycle)
            .field("params", &self.driver.params)
            .finish()
    }
}

impl ObjectStoreClient {
    pub fn new(params: StorageParams, config: &Configuration) -> Self {
        Self {
            lifecycle: Lifecycle::new(Backend::ObjectStore, config.retry, config.connect_timeout),
            driver: OperatorDriver::new(params),
        }
    }

    /// Client for the configured MinIO bucket.
    pub fn minio(config: &Configuration) -> Self {
        Self::new(StorageParams::from_settings(&config.object_store), config)
    }

    /// Client over a local directory.
    pub fn local(root: impl AsRef<Path>, config: &Configuration) -> Self {
        Self::new(StorageParams::local(root.as_ref()), config)
    }

    pub fn params(&self) -> &StorageParams {
        &self.driver.params
    }

    /// `s3://bucket/key` (or `file://root/key`) for a key.
    pub fn object_uri(&self, key: &str) -> String {
        format!(
            "{}://{}/{}",
            self.driver.params.storage_type().uri_scheme(),
            self.driver.params.container().trim_end_matches('/'),
            normalize_key(key)
        )
    }

    async fn operator(&self) -> Result<Operator> {
        self.driver
            .get_operator()
            .await
            .map_err(|e| e.into_client_error(Backend::ObjectStore))
    }

    fn local_io_error(err: anyhow::Error) -> ClientError {
        ClientError::Operation {
            backend: Backend::ObjectStore,
            source: err,
        }
    }

    /// Copy a local file to `remote_key`. Returns the number of bytes written.
    pub async fn upload(&self, local_path: impl AsRef<Path>, remote_key: &str) -> Result<u64> {
        let local_path = local_path.as_ref();
        let _guard = self.lifecycle.acquire(&self.driver).await?;
        let op = self.operator().await?;

        let data = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("cannot read {}", local_path.display()))
            .map_err(Self::local_io_error)?;
        let size = data.len() as u64;

        let key = normalize_key(remote_key);
        op.write(key, data)
            .await
            .map_err(|e| classify(e, key).into_client_error(Backend::ObjectStore))?;

        tracing::info!(
            backend = %Backend::ObjectStore,
            key,
            bytes = size,
            source = %local_path.display(),
            "uploaded object"
        );
        Ok(size)
    }

    /// Copy `remote_key` to a local file, creating parent directories.
    pub async fn download(&self, remote_key: &str, local_path: impl AsRef<Path>) -> Result<u64> {
        let local_path = local_path.as_ref();
        let _guard = self.lifecycle.acquire(&self.driver).await?;
        let op = self.operator().await?;

        let key = normalize_key(remote_key);
        let data = op
            .read(key)
            .await
            .map_err(|e| classify(e, key).into_client_error(Backend::ObjectStore))?
            .to_vec();

        if let Some(parent) = local_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create {}", parent.display()))
                .map_err(Self::local_io_error)?;
        }
        tokio::fs::write(local_path, &data)
            .await
            .with_context(|| format!("cannot write {}", local_path.display()))
            .map_err(Self::local_io_error)?;

        tracing::info!(
            backend = %Backend::ObjectStore,
            key,
            bytes = data.len(),
            destination = %local_path.display(),
            "downloaded object"
        );
        Ok(data.len() as u64)
    }

    /// Objects under `prefix`, recursively, sorted by key.
    pub async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let _guard = self.lifecycle.acquire(&self.driver).await?;
        let op = self.operator().await?;

        let prefix = normalize_key(prefix);
        let entries = match op.list_with(prefix).recursive(true).await {
            Ok(entries) => entries,
            // A prefix with no objects under it is just empty
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(classify(e, prefix).into_client_error(Backend::ObjectStore)),
        };

        // The filesystem lister only reports the entry mode
        let needs_stat = self.driver.params.storage_type() == StorageType::LocalFs;
        let mut objects = Vec::new();
        for entry in entries {
            if entry.metadata().mode() != EntryMode::FILE {
                continue;
            }
            let meta = if needs_stat {
                op.stat(entry.path())
                    .await
                    .map_err(|e| classify(e, entry.path()).into_client_error(Backend::ObjectStore))?
            } else {
                entry.metadata().clone()
            };
            objects.push(ObjectInfo {
                key: entry.path().to_string(),
                size: meta.content_length(),
                last_modified: meta.last_modified(),
                etag: meta.etag().map(str::to_string),
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    /// Delete an object. Deleting a missing key succeeds.
    pub async fn delete(&self, remote_key: &str) -> Result<()> {
        let _guard = self.lifecycle.acquire(&self.driver).await?;
        let op = self.operator().await?;

        let key = normalize_key(remote_key);
        op.delete(key)
            .await
            .map_err(|e| classify(e, key).into_client_error(Backend::ObjectStore))?;
        tracing::debug!(backend = %Backend::ObjectStore, key, "deleted object");
        Ok(())
    }

    pub async fn exists(&self, remote_key: &str) -> Result<bool> {
        let _guard = self.lifecycle.acquire(&self.driver).await?;
        let op = self.operator().await?;

        let key = normalize_key(remote_key);
        op.exists(key)
            .await
            .map_err(|e| classify(e, key).into_client_error(Backend::ObjectStore))
    }
}

#[async_trait]
impl BackendClient for ObjectStoreClient {
    fn backend(&self) -> Backend {
        Backend::ObjectStore
    }

    async fn state(&self) -> ClientState {
        self.lifecycle.state().await
    }

    async fn connect(&self) -> Result<()> {
        self.lifecycle.connect(&self.driver).await
    }

    async fn is_healthy(&self) -> bool {
        self.lifecycle.check_health(&self.driver).await
    }

    async fn close(&self) -> Result<()> {
        self.lifecycle.close(&self.driver).await
    }
}
