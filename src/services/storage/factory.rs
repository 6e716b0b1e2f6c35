//! Operator factory.
//!
//! Builds the OpenDAL operator matching a set of `StorageParams`.

use anyhow::anyhow;
use opendal::layers::LoggingLayer;
use opendal::services::{Fs, S3};
use opendal::{ErrorKind, Operator};

use super::types::StorageParams;
use crate::error::DriverError;

pub struct StorageFactory;

impl StorageFactory {
    /// Build an operator. Nothing is contacted until the first request.
    pub fn build_operator(params: &StorageParams) -> Result<Operator, DriverError> {
        params
            .validate()
            .map_err(|e| DriverError::connection(anyhow!(e)))?;

        let op = match params {
            StorageParams::S3 {
                endpoint,
                region,
                bucket,
                access_key_id,
                secret_access_key,
            } => {
                let mut builder = S3::default()
                    .bucket(bucket)
                    .region(region)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key.expose());
                if let Some(ep) = endpoint.as_deref().filter(|ep| !ep.is_empty()) {
                    builder = builder.endpoint(ep);
                }
                Operator::new(builder)
                    .map_err(DriverError::connection)?
                    .layer(LoggingLayer::default())
                    .finish()
            }
            StorageParams::LocalFs { root } => {
                let root = root
                    .to_str()
                    .ok_or_else(|| DriverError::connection(anyhow!("invalid path encoding")))?;
                Operator::new(Fs::default().root(root))
                    .map_err(DriverError::connection)?
                    .layer(LoggingLayer::default())
                    .finish()
            }
        };
        Ok(op)
    }
}

/// Map an OpenDAL failure on `key` to a driver error.
pub fn classify(err: opendal::Error, key: &str) -> DriverError {
    match err.kind() {
        ErrorKind::NotFound => DriverError::not_found(key),
        ErrorKind::PermissionDenied | ErrorKind::ConfigInvalid => DriverError::connection(err),
        _ if err.is_temporary() => DriverError::connection(err),
        _ => DriverError::operation(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;

    #[test]
    fn test_build_local_operator() {
        let dir = tempfile::tempdir().unwrap();
        let op = StorageFactory::build_operator(&StorageParams::local(dir.path()));
        assert!(op.is_ok());
    }

    #[test]
    fn test_build_rejects_invalid_params() {
        let params = StorageParams::S3 {
            endpoint: Some("http://localhost:9000".to_string()),
            region: "us-east-1".to_string(),
            bucket: String::new(),
            access_key_id: "minio".to_string(),
            secret_access_key: Secret::new("minio123"),
        };
        let err = StorageFactory::build_operator(&params).unwrap_err();
        assert!(matches!(err, DriverError::Connection(_)));
    }

    #[test]
    fn test_classify_not_found() {
        let err = opendal::Error::new(ErrorKind::NotFound, "missing");
        assert!(matches!(classify(err, "a/b.csv"), DriverError::NotFound(key) if key == "a/b.csv"));
    }
}
