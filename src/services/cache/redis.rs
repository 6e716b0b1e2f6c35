//! Redis driver over a multiplexed async connection.

use std::time::Duration;

use ::redis::aio::MultiplexedConnection;
use ::redis::{ConnectionAddr, ConnectionInfo, ErrorKind, RedisConnectionInfo, RedisError};
use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheDriver;
use crate::config::CacheSettings;
use crate::error::{DriverError, DriverResult};
use crate::services::lifecycle::DriverLifecycle;

pub struct RedisDriver {
    settings: CacheSettings,
    connect_timeout: Duration,
    conn: RwLock<Option<MultiplexedConnection>>,
}

impl std::fmt::Debug for RedisDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisDriver")
            .field("host", &self.settings.host)
            .field("port", &self.settings.port)
            .field("db", &self.settings.db)
            .finish_non_exhaustive()
    }
}

impl RedisDriver {
    pub fn new(settings: CacheSettings, connect_timeout: Duration) -> Self {
        Self {
            settings,
            connect_timeout,
            conn: RwLock::new(None),
        }
    }

    /// Connection target; the password never goes through a URL.
    fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.settings.host.clone(), self.settings.port),
            redis: RedisConnectionInfo {
                db: i64::from(self.settings.db),
                password: self.settings.password.as_ref().map(|p| p.expose().to_string()),
                ..Default::default()
            },
        }
    }

    /// The multiplexed connection is cheap to clone and safe to share.
    async fn connection(&self) -> DriverResult<MultiplexedConnection> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| DriverError::connection(anyhow!("Redis connection not open")))
    }
}

fn classify(err: RedisError) -> DriverError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
        || err.kind() == ErrorKind::AuthenticationFailed
    {
        DriverError::connection(err)
    } else {
        DriverError::operation(err)
    }
}

async fn ping(conn: &mut MultiplexedConnection) -> DriverResult<()> {
    let pong: String = ::redis::cmd("PING").query_async(conn).await.map_err(classify)?;
    if pong != "PONG" {
        return Err(DriverError::connection(anyhow!("unexpected PING reply `{}`", pong)));
    }
    Ok(())
}

#[async_trait]
impl DriverLifecycle for RedisDriver {
    async fn open(&self) -> DriverResult<()> {
        let client =
            ::redis::Client::open(self.connection_info()).map_err(DriverError::connection)?;

        let connecting = client.get_multiplexed_async_connection();
        let mut conn = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| {
                DriverError::connection(anyhow!(
                    "timed out after {:?} connecting to {}:{}",
                    self.connect_timeout,
                    self.settings.host,
                    self.settings.port
                ))
            })?
            .map_err(classify)?;

        ping(&mut conn).await?;
        *self.conn.write().await = Some(conn);
        Ok(())
    }

    async fn ping(&self) -> DriverResult<()> {
        let mut conn = self.connection().await?;
        ping(&mut conn).await
    }

    async fn release(&self) -> DriverResult<()> {
        self.conn.write().await.take();
        Ok(())
    }
}

#[async_trait]
impl CacheDriver for RedisDriver {
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> DriverResult<()> {
        let mut conn = self.connection().await?;
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl.as_millis().max(1) as u64);
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(classify)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> DriverResult<Option<String>> {
        let mut conn = self.connection().await?;
        ::redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify)
    }

    async fn delete(&self, key: &str) -> DriverResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = ::redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> DriverResult<bool> {
        let mut conn = self.connection().await?;
        let found: i64 = ::redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(found > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    fn settings(password: Option<&str>) -> CacheSettings {
        CacheSettings {
            host: "redis".to_string(),
            port: 6379,
            db: 2,
            password: password.map(Secret::new),
        }
    }

    #[test]
    fn test_connection_info_keeps_raw_password() {
        let driver = RedisDriver::new(settings(Some("p@ss word/:")), Duration::from_secs(1));
        let info = driver.connection_info();

        assert!(matches!(&info.addr, ConnectionAddr::Tcp(host, 6379) if host == "redis"));
        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.password.as_deref(), Some("p@ss word/:"));
        assert_eq!(info.redis.username, None);
    }

    #[test]
    fn test_connection_info_without_password() {
        let driver = RedisDriver::new(settings(None), Duration::from_secs(1));
        assert_eq!(driver.connection_info().redis.password, None);
    }

    #[tokio::test]
    async fn test_commands_before_open_fail() {
        let driver = RedisDriver::new(settings(None), Duration::from_secs(1));
        let err = driver.get("k").await.unwrap_err();
        assert!(matches!(err, DriverError::Connection(_)));
    }
}
