//! Reconciliation of pushes the remote rejected as stale or orphaned.

use std::sync::Arc;

use super::config::ConflictStrategy;
use crate::models::{SyncConflict, SyncOperation, SyncQueueItem, Table};
use crate::remote::{Mutation, QueryFilter, RemoteApi, RemoteError, RemoteRecord};
use crate::store::LocalStore;
use crate::Result;

/// Counts from a resolve pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub resolved: usize,
    pub failed: usize,
}

/// Records conflicts and converges both sides once a winner is chosen
pub struct ConflictResolver<R> {
    store: LocalStore,
    remote: Arc<R>,
}

impl<R: RemoteApi> ConflictResolver<R> {
    pub const fn new(store: LocalStore, remote: Arc<R>) -> Self {
        Self { store, remote }
    }

    /// Persist the conflict for a rejected push and take the item out of the
    /// queue.
    ///
    /// When the remote rejected the write as stale without reporting its
    /// copy, the copy is fetched so both snapshots are kept.
    pub async fn capture(&self, item: &SyncQueueItem, error: RemoteError) -> Result<SyncConflict> {
        let remote = match error {
            RemoteError::VersionConflict {
                current: Some(record),
                ..
            } => Some(record),
            RemoteError::VersionConflict { current: None, .. } => {
                self.fetch(item.table, &item.entity_id).await?
            }
            _ => None,
        };

        let conflict = SyncConflict::new(
            item.table,
            &item.entity_id,
            item.operation,
            item.payload.clone(),
            remote.map(|record| (record.data, record.version)),
            self.store.now(),
        );
        tracing::info!(
            "Conflict on {}/{} ({}, remote {})",
            conflict.entity_type,
            conflict.entity_id,
            conflict.operation,
            if conflict.remote_deleted() {
                "deleted"
            } else {
                "changed"
            }
        );
        self.store.park_conflict(item, conflict).await
    }

    /// Converge one conflict on the local (`use_local`) or remote value and
    /// mark it resolved.
    pub async fn resolve(&self, conflict: &SyncConflict, use_local: bool) -> Result<()> {
        if use_local {
            self.keep_local(conflict).await?;
        } else {
            self.take_remote(conflict).await?;
        }
        self.store.mark_conflict_resolved(&conflict.id).await?;
        tracing::info!(
            "Resolved conflict on {}/{} in favour of the {} copy",
            conflict.entity_type,
            conflict.entity_id,
            if use_local { "local" } else { "remote" }
        );
        Ok(())
    }

    /// Apply `strategy` to every unresolved conflict.
    ///
    /// `Manual` leaves them untouched. A conflict that fails to resolve stays
    /// unresolved for the next pass.
    pub async fn resolve_all(&self, strategy: ConflictStrategy) -> Result<ResolveSummary> {
        let mut summary = ResolveSummary::default();
        let use_local = match strategy {
            ConflictStrategy::Manual => return Ok(summary),
            ConflictStrategy::LocalWins => true,
            ConflictStrategy::RemoteWins => false,
        };

        for conflict in self.store.conflicts().await? {
            if conflict.resolved {
                continue;
            }
            match self.resolve(&conflict, use_local).await {
                Ok(()) => summary.resolved += 1,
                Err(error) => {
                    tracing::warn!(
                        "Could not resolve conflict on {}/{}: {}",
                        conflict.entity_type,
                        conflict.entity_id,
                        error
                    );
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn fetch(&self, table: Table, id: &str) -> Result<Option<RemoteRecord>> {
        Ok(self
            .remote
            .query(table, &QueryFilter::ById(id.to_string()))
            .await?
            .into_iter()
            .find(|record| record.id == id))
    }

    /// Re-push the local value unconditionally.
    async fn keep_local(&self, conflict: &SyncConflict) -> Result<()> {
        let table = conflict.entity_type;
        let id = conflict.entity_id.as_str();

        if conflict.operation == SyncOperation::Delete {
            if !conflict.remote_deleted() {
                let mutation = Mutation {
                    operation: SyncOperation::Delete,
                    table,
                    entity_id: id.to_string(),
                    payload: conflict.local_data.clone(),
                    base_version: None,
                };
                match self.remote.mutate(&mutation).await {
                    Ok(_) | Err(RemoteError::NotFound { .. }) => {}
                    Err(error) => return Err(error.into()),
                }
            }
            return self.store.accept_remote(table, id, None).await;
        }

        // Edits made after the conflict was recorded win over the snapshot
        let payload = self
            .store
            .document(table, id)
            .await?
            .unwrap_or_else(|| conflict.local_data.clone());
        let mut mutation = Mutation {
            operation: if conflict.remote_deleted() {
                SyncOperation::Create
            } else {
                SyncOperation::Update
            },
            table,
            entity_id: id.to_string(),
            payload: payload.clone(),
            base_version: None,
        };

        let ack = match self.remote.mutate(&mutation).await {
            Ok(ack) => ack,
            Err(RemoteError::NotFound { .. }) if mutation.operation == SyncOperation::Update => {
                mutation.operation = SyncOperation::Create;
                self.remote.mutate(&mutation).await?
            }
            Err(error) => return Err(error.into()),
        };

        let record = RemoteRecord {
            id: ack.id,
            version: ack.version,
            data: payload,
        };
        self.store.accept_remote(table, id, Some(&record)).await
    }

    /// Accept whatever the remote currently holds.
    async fn take_remote(&self, conflict: &SyncConflict) -> Result<()> {
        let table = conflict.entity_type;
        let id = conflict.entity_id.as_str();
        let current = self.fetch(table, id).await?;
        self.store.accept_remote(table, id, current.as_ref()).await
    }
}
