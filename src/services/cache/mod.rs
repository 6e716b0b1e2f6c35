//! Key-value cache client.
//!
//! `CacheClient` stores string values with an optional expiry. Missing and
//! expired keys are reported as [`CacheLookup::Absent`], never as an error
//! and never as an empty string.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

pub use memory::MemoryCache;
pub use self::redis::RedisDriver;

use crate::config::Configuration;
use crate::error::{DriverResult, Result};
use crate::services::lifecycle::{DriverLifecycle, Lifecycle};
use crate::services::traits::{Backend, BackendClient, ClientState};

/// Result of a cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(String),
    Absent,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Hit(v) => Some(v),
            Self::Absent => None,
        }
    }

    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Hit(v) => Some(v),
            Self::Absent => None,
        }
    }
}

impl From<Option<String>> for CacheLookup {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Absent, Self::Hit)
    }
}

/// Native cache behind a `CacheClient`.
#[async_trait]
pub trait CacheDriver: DriverLifecycle {
    /// Store `value`; `ttl` is already normalized (never zero).
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DriverResult<()>;

    async fn get(&self, key: &str) -> DriverResult<Option<String>>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> DriverResult<bool>;

    async fn exists(&self, key: &str) -> DriverResult<bool>;
}

pub struct CacheClient {
    lifecycle: Lifecycle,
    driver: Box<dyn CacheDriver>,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

impl CacheClient {
    pub fn new(driver: Box<dyn CacheDriver>, config: &Configuration) -> Self {
        Self {
            lifecycle: Lifecycle::new(Backend::Cache, config.retry, config.connect_timeout),
            driver,
        }
    }

    /// Client for the configured Redis server.
    pub fn redis(config: &Configuration) -> Self {
        let driver = RedisDriver::new(config.cache.clone(), config.connect_timeout);
        Self::new(Box::new(driver), config)
    }

    /// Client over an in-process map.
    pub fn memory(config: &Configuration) -> Self {
        Self::new(Box::new(MemoryCache::new()), config)
    }

    /// Store a value. `None` or a zero `ttl` means no expiry.
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let _guard = self.lifecycle.acquire(self.driver.as_ref()).await?;
        let ttl = ttl.filter(|d| !d.is_zero());
        let ttl_ms = ttl.map(|d| d.as_millis() as u64);
        tracing::debug!(backend = %Backend::Cache, key, ttl_ms, "set");
        self.driver
            .set(key, value, ttl)
            .await
            .map_err(|e| e.into_client_error(Backend::Cache))
    }

    pub async fn get(&self, key: &str) -> Result<CacheLookup> {
        let _guard = self.lifecycle.acquire(self.driver.as_ref()).await?;
        let lookup = self
            .driver
            .get(key)
            .await
            .map(CacheLookup::from)
            .map_err(|e| e.into_client_error(Backend::Cache))?;
        tracing::debug!(backend = %Backend::Cache, key, hit = lookup.is_hit(), "get");
        Ok(lookup)
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        let _guard = self.lifecycle.acquire(self.driver.as_ref()).await?;
        self.driver
            .delete(key)
            .await
            .map_err(|e| e.into_client_error(Backend::Cache))
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let _guard = self.lifecycle.acquire(self.driver.as_ref()).await?;
        self.driver
            .exists(key)
            .await
            .map_err(|e| e.into_client_error(Backend::Cache))
    }
}

#[async_trait]
impl BackendClient for CacheClient {
    fn backend(&self) -> Backend {
        Backend::Cache
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_conversions() {
        assert_eq!(CacheLookup::from(None), CacheLookup::Absent);
        let hit = CacheLookup::from(Some(String::new()));
        assert!(hit.is_hit());
        assert_eq!(hit.value(), Some(""));
        assert_eq!(CacheLookup::Absent.into_option(), None);
    }
}
