#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use lakehouse_clients::Configuration;

/// Complete environment pointing at hosts nothing listens on.
pub fn base_env() -> HashMap<String, String> {
    [
        ("APP_NAME", "lakehouse-tests"),
        ("TRINO_HOST", "127.0.0.1"),
        ("TRINO_PORT", "9"),
        ("TRINO_USER", "analyst"),
        ("POSTGRES_HOST", "127.0.0.1"),
        ("POSTGRES_PORT", "9"),
        ("POSTGRES_USER", "lakehouse"),
        ("POSTGRES_PASSWORD", "secret"),
        ("REDIS_HOST", "127.0.0.1"),
        ("REDIS_PORT", "9"),
        ("MINIO_ENDPOINT", "127.0.0.1:9"),
        ("MINIO_ACCESS_KEY", "minio"),
        ("MINIO_SECRET_KEY", "minio-secret"),
        ("CONNECT_TIMEOUT_SECONDS", "1"),
        ("CONNECT_RETRIES", "0"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn config_from(env: HashMap<String, String>) -> Arc<Configuration> {
    let config = Configuration::from_lookup(|name| env.get(name).cloned())
        .expect("test environment is complete");
    Arc::new(config)
}

pub fn test_config() -> Arc<Configuration> {
    config_from(base_env())
}

/// Config whose Trino settings point at `host:port`.
pub fn trino_config(host: &str, port: u16) -> Arc<Configuration> {
    let mut env = base_env();
    env.insert("TRINO_HOST".into(), host.to_string());
    env.insert("TRINO_PORT".into(), port.to_string());
    config_from(env)
}
