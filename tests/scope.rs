mod common;

use std::sync::Arc;

use lakehouse_clients::services::LocalFactory;
use lakehouse_clients::{
    Backend, BackendClient, ClientError, ClientRegistry, ClientScope, ClientState,
};
use tempfile::TempDir;

fn shared_registry(dir: &TempDir) -> Arc<ClientRegistry> {
    Arc::new(ClientRegistry::with_factory(
        common::test_config(),
        Arc::new(LocalFactory::new(dir.path())),
    ))
}

#[tokio::test]
async fn scope_closes_clients_after_success() {
    let dir = TempDir::new().unwrap();
    let registry = shared_registry(&dir);

    let cache = ClientScope::shared(Arc::clone(&registry))
        .run(|clients| async move {
            let cache = clients.cache().await?;
            cache.set("greeting", "hello", None).await?;
            Ok::<_, ClientError>(cache)
        })
        .await
        .unwrap();

    assert_eq!(cache.state().await, ClientState::Closed);
    assert!(!registry.is_initialized(Backend::Cache).await);
}

#[tokio::test]
async fn scope_closes_clients_when_body_fails() {
    let dir = TempDir::new().unwrap();
    let registry = shared_registry(&dir);

    let err = ClientScope::shared(Arc::clone(&registry))
        .run(|clients| async move {
            clients.database().await?;
            clients.object_store().await?;
            let db = clients.database().await?;
            db.query("SELECT * FROM no_such_table", &[]).await?;
            Ok::<_, ClientError>(())
        })
        .await
        .unwrap_err();

    assert!(err.is_operation());
    for backend in Backend::all() {
        assert!(!registry.is_initialized(backend).await);
    }
}

#[tokio::test]
async fn scope_closes_clients_when_body_panics() {
    let dir = TempDir::new().unwrap();
    let registry = shared_registry(&dir);

    let scoped = Arc::clone(&registry);
    let outcome = tokio::spawn(async move {
        ClientScope::shared(scoped)
            .run(|clients| async move {
                clients.cache().await?;
                if clients.is_initialized(Backend::Cache).await {
                    panic!("body gave up");
                }
                Ok::<_, ClientError>(())
            })
            .await
    })
    .await;

    assert!(outcome.unwrap_err().is_panic());
    assert!(!registry.is_initialized(Backend::Cache).await);
}

#[tokio::test]
async fn fresh_scope_builds_its_own_registry() {
    let dir = TempDir::new().unwrap();
    let factory = Arc::new(LocalFactory::new(dir.path()));

    let tables = ClientScope::fresh_with_factory(common::test_config(), factory)
        .run(|clients| async move {
            let db = clients.database().await?;
            db.execute("CREATE TABLE events (id INTEGER)", &[]).await?;
            let result = db
                .query("SELECT name FROM sqlite_master WHERE type = 'table'", &[])
                .await?;
            Ok::<_, ClientError>(result.row_count)
        })
        .await
        .unwrap();

    assert_eq!(tables, 1);
}
