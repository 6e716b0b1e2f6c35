//! Object store client (MinIO / S3).
//!
//! Built on OpenDAL operators:
//! - **Types** (`types`): `StorageParams`, `StorageType`, `ObjectInfo`
//! - **Factory** (`factory`): operator construction and error mapping
//! - **Client** (`client`): `ObjectStoreClient` and its operator driver

pub mod client;
pub mod factory;
pub mod types;

pub use client::{ObjectStoreClient, OperatorDriver};
pub use factory::StorageFactory;
pub use types::{ObjectInfo, StorageParams, StorageType};
