//! Configuration management module
//!
//! Typed, immutable settings for every backend, resolved from environment
//! variables. `.env` loading is left to the binary.

pub mod settings;

pub use settings::{
    CacheSettings, Configuration, DatabaseSettings, EmailSettings, Environment, FeatureFlags,
    ObjectStoreSettings, ProcessingSettings, QuerySettings, RetryPolicy, Secret,
};
