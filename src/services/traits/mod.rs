//! Client abstraction traits and types.
//!
//! This module provides the uniform surface shared by every backend client:
//!
//! - **Client** (`client`): the `Backend` enum, `ClientState` and the
//!   `BackendClient` lifecycle trait the registry drives
//! - **Row/Value** (`row`): backend-agnostic tabular results

pub mod client;
pub mod row;

pub use client::{Backend, BackendClient, ClientState};

pub use row::{ColumnInfo, QueryResult, Row, Value};
