//! Contract with the authoritative backend.
//!
//! The orchestrator only talks to the remote through [`RemoteApi`]; failures
//! come back as a typed [`RemoteError`] so conflict routing never depends on
//! matching error message text.

mod http;
mod memory;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{SyncOperation, Table};

pub use http::{HttpRemoteApi, RemoteConfig};
pub use memory::MemoryRemote;

/// A record as held by the remote, with the version used to detect staleness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Canonical id
    pub id: String,
    /// Monotonic version, bumped on every remote write
    pub version: i64,
    /// Domain fields
    pub data: serde_json::Value,
}

/// Selection for [`RemoteApi::query`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    /// The complete table
    All,
    /// A single record by id
    ById(String),
}

/// A write to apply remotely
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub operation: SyncOperation,
    pub table: Table,
    pub entity_id: String,
    pub payload: serde_json::Value,
    /// Version the write is based on; `None` writes unconditionally
    pub base_version: Option<i64>,
}

/// Acknowledgement of a successful remote write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAck {
    /// Canonical id (may differ from the local id after a create)
    pub id: String,
    pub version: i64,
}

/// Typed remote failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// Timeouts, 5xx responses, connectivity loss
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote copy changed since the local copy was last synchronized
    #[error("version conflict on {table}/{id}")]
    VersionConflict {
        table: Table,
        id: String,
        /// Current remote copy, when the remote reported it
        current: Option<RemoteRecord>,
    },

    /// The target no longer exists remotely
    #[error("{table}/{id} not found on remote")]
    NotFound { table: Table, id: String },

    /// Malformed payload; retrying will not help
    #[error("remote rejected payload: {0}")]
    Validation(String),
}

impl RemoteError {
    /// Returns true if the failed call can be retried as-is.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns true if the failure should be routed to conflict resolution.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. } | Self::NotFound { .. })
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Query/mutation contract of the authoritative backend.
///
/// Implementations own their timeouts; a timed-out call must surface as
/// [`RemoteError::Transient`].
pub trait RemoteApi: Send + Sync {
    /// Fetch records of `table` matching `filter`.
    fn query(
        &self,
        table: Table,
        filter: &QueryFilter,
    ) -> impl Future<Output = RemoteResult<Vec<RemoteRecord>>> + Send;

    /// Apply a create, update or delete.
    fn mutate(&self, mutation: &Mutation) -> impl Future<Output = RemoteResult<RemoteAck>> + Send;

    /// Download raw bytes for an image URL.
    fn fetch_blob(&self, url: &str) -> impl Future<Output = RemoteResult<Vec<u8>>> + Send;
}
