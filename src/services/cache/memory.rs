//! In-process cache driver for local runs and tests.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::CacheDriver;
use crate::error::{DriverError, DriverResult};
use crate::services::lifecycle::DriverLifecycle;

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Map-backed cache with the same expiry semantics as Redis.
///
/// Entries live only while the driver is open.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<Option<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> T,
    ) -> DriverResult<T> {
        let mut guard = self.entries.lock().await;
        let entries = guard
            .as_mut()
            .ok_or_else(|| DriverError::connection(anyhow!("memory cache not open")))?;

        let now = Instant::now();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(f(entries))
    }
}

#[async_trait]
impl DriverLifecycle for MemoryCache {
    async fn open(&self) -> DriverResult<()> {
        self.entries.lock().await.get_or_insert_with(HashMap::new);
        Ok(())
    }

    async fn ping(&self) -> DriverResult<()> {
        self.with_entries(|_| ()).await
    }

    async fn release(&self) -> DriverResult<()> {
        self.entries.lock().await.take();
        Ok(())
    }
}

#[async_trait]
impl CacheDriver for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DriverResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.with_entries(|entries| {
            entries.insert(key.to_string(), entry);
        })
        .await
    }

    async fn get(&self, key: &str) -> DriverResult<Option<String>> {
        self.with_entries(|entries| entries.get(key).map(|e| e.value.clone()))
            .await
    }

    async fn delete(&self, key: &str) -> DriverResult<bool> {
        self.with_entries(|entries| entries.remove(key).is_some()).await
    }

    async fn exists(&self, key: &str) -> DriverResult<bool> {
        self.with_entries(|entries| entries.contains_key(key)).await
    }
}
