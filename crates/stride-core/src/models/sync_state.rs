//! Derived sync state broadcast to listeners.

use serde::{Deserialize, Serialize};

use super::sync_conflict::SyncConflict;

/// Coarse status of the synchronizer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatusKind {
    #[default]
    Idle,
    Syncing,
    Error,
    /// Last cycle completed but unresolved conflicts remain
    Conflict,
}

/// A recorded cycle-level or terminal item failure
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncErrorRecord {
    /// Unix ms
    pub timestamp: i64,
    pub message: String,
}

/// Snapshot of the synchronizer, recomputed after every cycle
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatusKind,
    /// Last successful cycle (Unix ms)
    pub last_sync: Option<i64>,
    /// Number of queued local mutations
    pub pending_operations: usize,
    pub errors: Vec<SyncErrorRecord>,
    pub conflicts: Vec<SyncConflict>,
}

impl SyncState {
    /// Conflicts still awaiting resolution
    pub fn unresolved_conflicts(&self) -> impl Iterator<Item = &SyncConflict> {
        self.conflicts.iter().filter(|conflict| !conflict.resolved)
    }

    #[must_use]
    pub fn has_unresolved_conflicts(&self) -> bool {
        self.unresolved_conflicts().next().is_some()
    }
}
