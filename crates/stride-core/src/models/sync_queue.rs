//! Durable sync queue item model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::Table;
use crate::error::{Error, Result};

/// Number of failed attempts after which a queue item is dropped.
pub const MAX_RETRY_COUNT: u32 = 3;

/// Kind of mutation recorded in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::InvalidInput(format!("unknown sync operation: {other}"))),
        }
    }
}

/// A local mutation awaiting acknowledgement by the remote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    /// Opaque id derived from table, operation, entity id and a nonce
    pub id: String,
    pub operation: SyncOperation,
    pub table: Table,
    /// Id of the entity the mutation targets
    pub entity_id: String,
    /// Entity snapshot at enqueue time
    pub payload: serde_json::Value,
    /// Remote version the local copy was based on, if it was ever synced
    pub base_version: Option<i64>,
    /// Enqueue time (Unix ms)
    pub timestamp: i64,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl SyncQueueItem {
    /// Build a fresh queue item with a unique id
    #[must_use]
    pub fn new(
        operation: SyncOperation,
        table: Table,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
        base_version: Option<i64>,
        timestamp: i64,
    ) -> Self {
        let entity_id = entity_id.into();
        let nonce = Uuid::now_v7().simple();
        Self {
            id: format!("{table}:{operation}:{entity_id}:{nonce}"),
            operation,
            table,
            entity_id,
            payload,
            base_version,
            timestamp,
            retry_count: 0,
            last_error: None,
        }
    }

    /// Whether one more failure would exhaust the retry budget
    #[must_use]
    pub const fn is_last_attempt(&self) -> bool {
        self.retry_count + 1 >= MAX_RETRY_COUNT
    }
}
