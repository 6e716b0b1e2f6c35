//! Shared connection lifecycle for backend clients.
//!
//! Every client pairs a native driver with a [`Lifecycle`]. The lifecycle
//! owns the `ClientState` behind an async `RwLock`: operations hold a read
//! guard for their whole duration, while `connect` and `close` take the write
//! guard. Closing therefore waits for in-flight operations, and an operation
//! can never observe a half-closed driver.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::config::RetryPolicy;
use crate::error::{ClientError, DriverError, DriverResult, Result};
use crate::services::traits::{Backend, ClientState};

/// Connection management every native driver provides.
#[async_trait]
pub trait DriverLifecycle: Send + Sync {
    /// Open the native handle.
    async fn open(&self) -> DriverResult<()>;

    /// Cheap round trip against an open handle.
    async fn ping(&self) -> DriverResult<()>;

    /// Release the native handle. Called at most once, after a successful open.
    async fn release(&self) -> DriverResult<()>;
}

/// State machine shared by all clients.
#[derive(Debug)]
pub struct Lifecycle {
    backend: Backend,
    retry: RetryPolicy,
    health_timeout: Duration,
    state: RwLock<ClientState>,
}

impl Lifecycle {
    pub fn new(backend: Backend, retry: RetryPolicy, health_timeout: Duration) -> Self {
        Self {
            backend,
            retry,
            health_timeout,
            state: RwLock::new(ClientState::Uninitialized),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// Open the driver unless already connected.
    pub async fn connect<D>(&self, driver: &D) -> Result<()>
    where
        D: DriverLifecycle + ?Sized,
    {
        let mut state = self.state.write().await;
        match *state {
            ClientState::Connected => Ok(()),
            ClientState::Closed => Err(ClientError::Closed {
                backend: self.backend,
            }),
            ClientState::Uninitialized => {
                self.open_with_retry(driver).await?;
                *state = ClientState::Connected;
                Ok(())
            }
        }
    }

    async fn open_with_retry<D>(&self, driver: &D) -> Result<()>
    where
        D: DriverLifecycle + ?Sized,
    {
        let mut attempt = 0;
        loop {
            match driver.open().await {
                Ok(()) => {
                    tracing::info!(backend = %self.backend, attempt, "client connected");
                    return Ok(());
                }
                Err(err)
                    if attempt < self.retry.max_retries
                        && !matches!(err, DriverError::NotFound(_)) =>
                {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        backend = %self.backend,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        backend = %self.backend,
                        attempt,
                        error = %err,
                        "connect failed"
                    );
                    return Err(match err {
                        not_found @ DriverError::NotFound(_) => {
                            not_found.into_client_error(self.backend)
                        }
                        other => ClientError::Connection {
                            backend: self.backend,
                            source: other.into_anyhow(),
                        },
                    });
                }
            }
        }
    }

    /// Guard for running one operation, connecting first if needed.
    ///
    /// The returned guard must be held until the operation completes.
    pub async fn acquire<D>(&self, driver: &D) -> Result<RwLockReadGuard<'_, ClientState>>
    where
        D: DriverLifecycle + ?Sized,
    {
        loop {
            let state = self.state.read().await;
            match *state {
                ClientState::Connected => return Ok(state),
                ClientState::Closed => {
                    return Err(ClientError::Closed {
                        backend: self.backend,
                    });
                }
                ClientState::Uninitialized => {
                    drop(state);
                    self.connect(driver).await?;
                }
            }
        }
    }

    /// Ping the driver if connected. Never connects and never fails.
    pub async fn check_health<D>(&self, driver: &D) -> bool
    where
        D: DriverLifecycle + ?Sized,
    {
        let state = self.state.read().await;
        if *state != ClientState::Connected {
            return false;
        }

        match tokio::time::timeout(self.health_timeout, driver.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::warn!(backend = %self.backend, error = %err, "health check failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    backend = %self.backend,
                    timeout_ms = self.health_timeout.as_millis() as u64,
                    "health check timed out"
                );
                false
            }
        }
    }

    /// Move to `Closed`, releasing the driver if it was open.
    pub async fn close<D>(&self, driver: &D) -> Result<()>
    where
        D: DriverLifecycle + ?Sized,
    {
        let mut state = self.state.write().await;
        let previous = std::mem::replace(&mut *state, ClientState::Closed);
        if previous != ClientState::Connected {
            return Ok(());
        }

        driver.release().await.map_err(|err| {
            tracing::error!(backend = %self.backend, error = %err, "close failed");
            ClientError::Close {
                backend: self.backend,
                source: err.into_anyhow(),
            }
        })?;
        tracing::info!(backend = %self.backend, "client closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Driver that fails `failures` opens before succeeding.
    #[derive(Default)]
    struct FlakyDriver {
        failures: u32,
        opens: AtomicU32,
        releases: AtomicU32,
    }

    #[async_trait]
    impl DriverLifecycle for FlakyDriver {
        async fn open(&self) -> DriverResult<()> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(DriverError::connection(anyhow::anyhow!("refused")))
            } else {
                Ok(())
            }
        }

        async fn ping(&self) -> DriverResult<()> {
            Ok(())
        }

        async fn release(&self) -> DriverResult<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn lifecycle(max_retries: u32) -> Lifecycle {
        let retry = RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(1),
            multiplier: 1.0,
        };
        Lifecycle::new(Backend::Cache, retry, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let driver = FlakyDriver::default();
        let lc = lifecycle(0);

        lc.connect(&driver).await.unwrap();
        lc.connect(&driver).await.unwrap();

        assert_eq!(driver.opens.load(Ordering::SeqCst), 1);
        assert_eq!(lc.state().await, ClientState::Connected);
    }

    #[tokio::test]
    async fn test_connect_retries_then_succeeds() {
        let driver = FlakyDriver {
            failures: 1,
            ..Default::default()
        };
        let lc = lifecycle(1);

        lc.connect(&driver).await.unwrap();
        assert_eq!(driver.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_retries() {
        let driver = FlakyDriver {
            failures: 5,
            ..Default::default()
        };
        let lc = lifecycle(2);

        let err = lc.connect(&driver).await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(driver.opens.load(Ordering::SeqCst), 3);
        assert_eq!(lc.state().await, ClientState::Uninitialized);
    }

    #[tokio::test]
    async fn test_health_check_does_not_connect() {
        let driver = FlakyDriver::default();
        let lc = lifecycle(0);

        assert!(!lc.check_health(&driver).await);
        assert_eq!(driver.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_close_from_any_state() {
        let driver = FlakyDriver::default();
        let lc = lifecycle(0);

        lc.close(&driver).await.unwrap();
        assert_eq!(lc.state().await, ClientState::Closed);
        assert_eq!(driver.releases.load(Ordering::SeqCst), 0);

        lc.close(&driver).await.unwrap();
        let err = lc.acquire(&driver).await.unwrap_err();
        assert!(err.is_closed());
        assert!(lc.connect(&driver).await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn test_acquire_auto_connects_and_close_releases_once() {
        let driver = FlakyDriver::default();
        let lc = lifecycle(0);

        {
            let guard = lc.acquire(&driver).await.unwrap();
            assert_eq!(*guard, ClientState::Connected);
        }
        lc.close(&driver).await.unwrap();
        lc.close(&driver).await.unwrap();

        assert_eq!(driver.releases.load(Ordering::SeqCst), 1);
    }
}
