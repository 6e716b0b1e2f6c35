//! Object store type definitions.
//!
//! This module contains:
//! - `StorageType` - The supported storage backends
//! - `StorageParams` - Backend-specific connection parameters
//! - `ObjectInfo` - Metadata about a stored object

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ObjectStoreSettings, Secret};

/// Supported storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// S3 and S3-compatible services (MinIO)
    S3,
    /// Local filesystem, for development and tests
    LocalFs,
}

impl StorageType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::S3 => "S3 / MinIO",
            Self::LocalFs => "Local Filesystem",
        }
    }

    /// URI scheme used for object URIs
    pub fn uri_scheme(&self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::LocalFs => "file",
        }
    }
}

/// Backend-specific connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageParams {
    S3 {
        /// Endpoint URL; `None` means AWS
        endpoint: Option<String>,
        region: String,
        bucket: String,
        access_key_id: String,
        secret_access_key: Secret,
    },
    LocalFs {
        /// Directory acting as the bucket
        root: PathBuf,
    },
}

impl StorageParams {
    /// Parameters for the configured MinIO bucket.
    pub fn from_settings(settings: &ObjectStoreSettings) -> Self {
        Self::S3 {
            endpoint: Some(settings.endpoint.as_str().trim_end_matches('/').to_string()),
            region: settings.region.clone(),
            bucket: settings.bucket.clone(),
            access_key_id: settings.access_key.clone(),
            secret_access_key: settings.secret_key.clone(),
        }
    }

    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::LocalFs { root: root.into() }
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Self::S3 { .. } => StorageType::S3,
            Self::LocalFs { .. } => StorageType::LocalFs,
        }
    }

    /// Bucket name, or the root directory for the filesystem backend.
    pub fn container(&self) -> String {
        match self {
            Self::S3 { bucket, .. } => bucket.clone(),
            Self::LocalFs { root } => root.display().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::S3 { bucket, region, .. } => {
                if bucket.is_empty() {
                    return Err("bucket name is required".to_string());
                }
                if region.is_empty() {
                    return Err("region is required".to_string());
                }
            }
            Self::LocalFs { root } => {
                if root.as_os_str().is_empty() {
                    return Err("root path is required".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Information about a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Key relative to the bucket root
    pub key: String,
    /// Size in bytes
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

impl ObjectInfo {
    /// Final path segment of the key
    pub fn name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Human-readable size
    pub fn size_display(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        match self.size {
            s if s >= GB => format!("{:.2} GB", s as f64 / GB as f64),
            s if s >= MB => format!("{:.2} MB", s as f64 / MB as f64),
            s if s >= KB => format!("{:.2} KB", s as f64 / KB as f64),
            s => format!("{} B", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(StorageParams::local("/tmp/lake").validate().is_ok());
        assert!(StorageParams::local("").validate().is_err());

        let params = StorageParams::S3 {
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: String::new(),
            access_key_id: "minio".to_string(),
            secret_access_key: Secret::new("minio123"),
        };
        assert_eq!(params.validate().unwrap_err(), "bucket name is required");
    }

    #[test]
    fn test_object_info_display() {
        let info = ObjectInfo {
            key: "raw/2024/orders.parquet".to_string(),
            size: 1536,
            last_modified: None,
            etag: None,
        };
        assert_eq!(info.name(), "orders.parquet");
        assert_eq!(info.size_display(), "1.50 KB");
    }
}
