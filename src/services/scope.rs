//! Scoped access to a client registry.
//!
//! [`ClientScope::run`] hands a registry to an async body and always calls
//! `close_all` afterwards, whether the body returned, failed or panicked.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use super::factory::{BackendFactory, ClientFactory};
use super::registry::ClientRegistry;
use crate::config::Configuration;
use crate::error::TeardownError;

/// Where the scope's registry comes from.
pub enum ScopePolicy {
    /// Reuse an existing registry; it is still torn down when the scope ends.
    Shared(Arc<ClientRegistry>),
    /// Build a new registry for this scope only.
    Fresh {
        config: Arc<Configuration>,
        factory: Arc<dyn ClientFactory>,
    },
}

pub struct ClientScope {
    policy: ScopePolicy,
}

impl ClientScope {
    pub fn new(policy: ScopePolicy) -> Self {
        Self { policy }
    }

    pub fn shared(registry: Arc<ClientRegistry>) -> Self {
        Self::new(ScopePolicy::Shared(registry))
    }

    /// Fresh registry over the production backends.
    pub fn fresh(config: Arc<Configuration>) -> Self {
        Self::fresh_with_factory(config, Arc::new(BackendFactory))
    }

    pub fn fresh_with_factory(config: Arc<Configuration>, factory: Arc<dyn ClientFactory>) -> Self {
        Self::new(ScopePolicy::Fresh { config, factory })
    }

    /// Run `body` with the registry, then tear it down.
    ///
    /// An error from `body` wins over a teardown error, which is then only
    /// logged. Panics are re-raised after teardown.
    pub async fn run<F, Fut, T, E>(self, body: F) -> Result<T, E>
    where
        F: FnOnce(Arc<ClientRegistry>) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TeardownError>,
    {
        let registry = match self.policy {
            ScopePolicy::Shared(registry) => registry,
            ScopePolicy::Fresh { config, factory } => {
                Arc::new(ClientRegistry::with_factory(config, factory))
            }
        };

        let scoped = Arc::clone(&registry);
        let outcome = AssertUnwindSafe(async move { body(scoped).await })
            .catch_unwind()
            .await;
        let teardown = registry.close_all().await;

        match outcome {
            Ok(Ok(value)) => teardown.map(|()| value).map_err(E::from),
            Ok(Err(err)) => {
                if let Err(teardown_err) = teardown {
                    tracing::error!(error = %teardown_err, "teardown failed after scope error");
                }
                Err(err)
            }
            Err(panic) => {
                if let Err(teardown_err) = teardown {
                    tracing::error!(error = %teardown_err, "teardown failed after scope panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// Run `body` against a fresh production registry that is torn down afterwards.
pub async fn with_clients<F, Fut, T, E>(config: Arc<Configuration>, body: F) -> Result<T, E>
where
    F: FnOnce(Arc<ClientRegistry>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TeardownError>,
{
    ClientScope::fresh(config).run(body).await
}
