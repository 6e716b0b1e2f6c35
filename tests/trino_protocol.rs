mod common;

use httpmock::prelude::*;
use lakehouse_clients::{Backend, BackendClient, ClientRegistry, HealthStatus, Value};
use serde_json::json;

async fn coordinator() -> MockServer {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/info");
            then.status(200)
                .json_body(json!({ "nodeVersion": { "version": "435" }, "starting": false }));
        })
        .await;
    server
}

fn registry_for(server: &MockServer) -> ClientRegistry {
    ClientRegistry::new(common::trino_config(&server.host(), server.port()))
}

#[tokio::test]
async fn statement_pages_are_followed() {
    let server = coordinator().await;

    let next_uri = server.url("/v1/statement/executing/q1/1");
    let submit = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/statement")
                .body("SELECT id, name FROM orders");
            then.status(200).json_body(json!({
                "id": "q1",
                "nextUri": next_uri,
                "columns": [
                    { "name": "id", "type": "bigint" },
                    { "name": "name", "type": "varchar" }
                ],
                "data": [[1, "first"]]
            }));
        })
        .await;
    let page = server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/statement/executing/q1/1");
            then.status(200).json_body(json!({
                "id": "q1",
                "data": [[2, "second"], [3, null]]
            }));
        })
        .await;

    let registry = registry_for(&server);
    let query = registry.query().await.unwrap();
    let result = query.execute("SELECT id, name FROM orders").await.unwrap();

    submit.assert_async().await;
    page.assert_async().await;
    assert_eq!(result.column_names(), vec!["id", "name"]);
    assert_eq!(result.row_count, 3);
    assert_eq!(result.rows[1].get_value(0), Some(&Value::Int64(2)));
    assert_eq!(result.rows[1].get_value(1), Some(&Value::Text("second".to_string())));
    assert_eq!(result.rows[2].get_value(1), Some(&Value::Null));

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn show_tables_returns_first_column() {
    let server = coordinator().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/statement").body("SHOW TABLES");
            then.status(200).json_body(json!({
                "id": "q2",
                "columns": [{ "name": "Table", "type": "varchar" }],
                "data": [["customers"], ["orders"]]
            }));
        })
        .await;

    let registry = registry_for(&server);
    let tables = registry.query().await.unwrap().show_tables().await.unwrap();
    assert_eq!(tables, vec!["customers", "orders"]);

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn engine_error_is_operation_error() {
    let server = coordinator().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/statement");
            then.status(200).json_body(json!({
                "id": "q3",
                "error": {
                    "message": "line 1:15: Table 'iceberg.default.missing' does not exist",
                    "errorName": "TABLE_NOT_FOUND",
                    "errorType": "USER_ERROR",
                    "errorCode": 46
                }
            }));
        })
        .await;

    let registry = registry_for(&server);
    let query = registry.query().await.unwrap();
    let err = query.execute("SELECT * FROM missing").await.unwrap_err();

    assert!(err.is_operation());
    assert_eq!(err.backend(), Some(Backend::Query));
    assert!(err.to_string().contains("TABLE_NOT_FOUND"));
    // The client stays usable after a rejected statement
    assert!(query.is_healthy().await);

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn describe_rejects_malformed_table_names() {
    let server = coordinator().await;
    let statements = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/statement");
            then.status(200).json_body(json!({ "id": "q4" }));
        })
        .await;

    let registry = registry_for(&server);
    let query = registry.query().await.unwrap();
    let err = query.describe_table("orders; DROP TABLE x").await.unwrap_err();
    assert!(err.is_operation());
    assert_eq!(statements.hits_async().await, 0);

    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn rejected_credentials_fail_connect() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/info");
            then.status(401);
        })
        .await;

    let registry = registry_for(&server);
    let err = registry.query().await.unwrap_err();
    assert!(err.is_connection());
    assert!(!registry.is_initialized(Backend::Query).await);
}

#[tokio::test]
async fn health_check_pings_coordinator() {
    let server = coordinator().await;

    let registry = registry_for(&server);
    registry.query().await.unwrap();

    let report = registry.health_check().await;
    assert_eq!(report.status(Backend::Query), HealthStatus::Healthy);
    assert_eq!(report.status(Backend::Cache), HealthStatus::NotInitialized);
    assert!(!report.all_healthy());

    registry.close_all().await.unwrap();
}
