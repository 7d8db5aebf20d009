//! Sync conflict model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::Table;
use super::sync_queue::SyncOperation;

/// A push rejected because the remote copy changed or disappeared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict identifier
    pub id: String,
    /// Table of the conflicting entity
    pub entity_type: Table,
    /// Entity involved in the conflict
    pub entity_id: String,
    /// Operation that was rejected
    pub operation: SyncOperation,
    /// Local snapshot that failed to push
    pub local_data: serde_json::Value,
    /// Remote snapshot; `None` when the remote copy no longer exists
    pub remote_data: Option<serde_json::Value>,
    /// Remote version at detection time
    pub remote_version: Option<i64>,
    /// Detection timestamp (Unix ms)
    pub timestamp: i64,
    pub resolved: bool,
}

impl SyncConflict {
    #[must_use]
    pub fn new(
        entity_type: Table,
        entity_id: impl Into<String>,
        operation: SyncOperation,
        local_data: serde_json::Value,
        remote: Option<(serde_json::Value, i64)>,
        timestamp: i64,
    ) -> Self {
        let (remote_data, remote_version) = match remote {
            Some((data, version)) => (Some(data), Some(version)),
            None => (None, None),
        };
        Self {
            id: Uuid::now_v7().to_string(),
            entity_type,
            entity_id: entity_id.into(),
            operation,
            local_data,
            remote_data,
            remote_version,
            timestamp,
            resolved: false,
        }
    }

    /// Whether the remote side deleted the entity
    #[must_use]
    pub const fn remote_deleted(&self) -> bool {
        self.remote_data.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_remote_marks_deletion() {
        let conflict = SyncConflict::new(
            Table::Shoes,
            "s1",
            SyncOperation::Update,
            serde_json::json!({"id": "s1"}),
            None,
            10,
        );
        assert!(conflict.remote_deleted());
        assert_eq!(conflict.remote_version, None);
        assert!(!conflict.resolved);
    }

    #[test]
    fn remote_snapshot_keeps_version() {
        let conflict = SyncConflict::new(
            Table::Runs,
            "r1",
            SyncOperation::Update,
            serde_json::json!({"id": "r1"}),
            Some((serde_json::json!({"id": "r1", "distance_km": 3.0}), 7)),
            10,
        );
        assert!(!conflict.remote_deleted());
        assert_eq!(conflict.remote_version, Some(7));
    }
}
