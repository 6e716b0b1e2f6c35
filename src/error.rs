//! Error taxonomy for the client layer.
//!
//! Configuration problems surface as [`ConfigError`] at startup. Everything a
//! client can fail with at runtime is a [`ClientError`], which always names the
//! backend it came from. Drivers report [`DriverError`] and the owning client
//! attaches the backend.

use std::fmt;

use thiserror::Error;

use crate::services::traits::Backend;

/// Bad or missing settings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable `{name}`")]
    Missing { name: String },

    #[error("invalid value `{value}` for `{name}`: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    /// Name of the offending variable.
    pub fn variable(&self) -> &str {
        match self {
            Self::Missing { name } | Self::Invalid { name, .. } => name,
        }
    }
}

/// Failure of a single client call.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot connect to {backend}: {source}")]
    Connection {
        backend: Backend,
        #[source]
        source: anyhow::Error,
    },

    #[error("{backend} operation failed: {source}")]
    Operation {
        backend: Backend,
        #[source]
        source: anyhow::Error,
    },

    #[error("{backend} client is closed")]
    Closed { backend: Backend },

    #[error("{backend}: `{key}` not found")]
    NotFound { backend: Backend, key: String },

    #[error("failed to close {backend} client: {source}")]
    Close {
        backend: Backend,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Teardown(#[from] TeardownError),
}

impl ClientError {
    /// Backend the error originated from, if it belongs to a single one.
    pub fn backend(&self) -> Option<Backend> {
        match self {
            Self::Connection { backend, .. }
            | Self::Operation { backend, .. }
            | Self::Closed { backend }
            | Self::NotFound { backend, .. }
            | Self::Close { backend, .. } => Some(*backend),
            Self::Config(_) | Self::Teardown(_) => None,
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Composite error from `close_all`: every adapter was asked to close and
/// these are the ones that failed.
#[derive(Debug, Default)]
pub struct TeardownError {
    failures: Vec<ClientError>,
}

impl TeardownError {
    pub fn new(failures: Vec<ClientError>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[ClientError] {
        &self.failures
    }

    /// Backends whose close failed, in close order.
    pub fn backends(&self) -> Vec<Backend> {
        self.failures.iter().filter_map(ClientError::backend).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_failures(self) -> Vec<ClientError> {
        self.failures
    }
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to close {} client(s)", self.failures.len())?;
        for (idx, failure) in self.failures.iter().enumerate() {
            let sep = if idx == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownError {}

/// Error reported by a native driver, before the client attaches its backend.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Transport or authentication failure.
    #[error("{0}")]
    Connection(anyhow::Error),

    /// The backend rejected the request.
    #[error("{0}")]
    Operation(anyhow::Error),

    /// The referenced key or object does not exist.
    #[error("`{0}` not found")]
    NotFound(String),
}

impl DriverError {
    pub fn connection(err: impl Into<anyhow::Error>) -> Self {
        Self::Connection(err.into())
    }

    pub fn operation(err: impl Into<anyhow::Error>) -> Self {
        Self::Operation(err.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Attach the backend and lift into the public error type.
    pub fn into_client_error(self, backend: Backend) -> ClientError {
        match self {
            Self::Connection(source) => ClientError::Connection { backend, source },
            Self::Operation(source) => ClientError::Operation { backend, source },
            Self::NotFound(key) => ClientError::NotFound { backend, key },
        }
    }

    /// Treat any failure as a connection failure (used while connecting).
    pub fn into_anyhow(self) -> anyhow::Error {
        match self {
            Self::Connection(err) | Self::Operation(err) => err,
            Self::NotFound(key) => anyhow::anyhow!("`{}` not found", key),
        }
    }
}

impl From<anyhow::Error> for DriverError {
    fn from(err: anyhow::Error) -> Self {
        Self::Operation(err)
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

pub type Result<T> = std::result::Result<T, ClientError>;
