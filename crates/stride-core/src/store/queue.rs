//! Durable sync queue with per-entity coalescing.
//!
//! At most one item is queued per entity: a new local write folds into the
//! pending item instead of appending, so concurrent push workers never race
//! on the same entity.

use libsql::Connection;

use super::entities::set_document_id;
use super::{begin, finish, LocalStore};
use crate::db::{EntityRepository, LibSqlEntityRepository, LibSqlQueueRepository, QueueRepository};
use crate::models::{SyncOperation, SyncQueueItem, SyncStatus, Table};
use crate::Result;

/// Result of recording a failed push attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The item stays queued with the new retry count
    Retrying(u32),
    /// The retry budget is exhausted and the item was removed
    Dropped(u32),
    /// The item was no longer queued
    Missing,
}

/// Queue `item`, folding it into any item already pending for its entity.
pub(super) async fn enqueue_locked(conn: &Connection, mut item: SyncQueueItem) -> Result<()> {
    let repo = LibSqlQueueRepository::new(conn);
    let Some(mut previous) = repo
        .list_for_entity(item.table, &item.entity_id)
        .await?
        .into_iter()
        .next()
    else {
        return repo.insert(&item).await;
    };

    let operation = match (previous.operation, item.operation) {
        // Never reached the remote, nothing to undo there
        (SyncOperation::Create, SyncOperation::Delete) => {
            repo.remove(&previous.id).await?;
            return Ok(());
        }
        (SyncOperation::Create, _) => SyncOperation::Create,
        (SyncOperation::Delete, SyncOperation::Delete) => return Ok(()),
        (SyncOperation::Delete | SyncOperation::Update, SyncOperation::Create) => {
            SyncOperation::Update
        }
        (_, operation) => operation,
    };

    set_document_id(&mut item.payload, &item.entity_id);
    previous.operation = operation;
    previous.payload = item.payload;
    // A fresh edit gets its own retry budget
    previous.retry_count = 0;
    previous.last_error = None;
    repo.replace(&previous).await
}

/// Remove every queued item for an entity.
pub(super) async fn drop_entity_items(conn: &Connection, table: Table, id: &str) -> Result<()> {
    let repo = LibSqlQueueRepository::new(conn);
    for item in repo.list_for_entity(table, id).await? {
        repo.remove(&item.id).await?;
    }
    Ok(())
}

/// Remove an item that will never be retried.
///
/// The record keeps its local value but becomes eligible for the next pull
/// once nothing else is queued for it.
async fn release_locked(conn: &Connection, item: &SyncQueueItem) -> Result<()> {
    let repo = LibSqlQueueRepository::new(conn);
    repo.remove(&item.id).await?;
    if repo
        .list_for_entity(item.table, &item.entity_id)
        .await?
        .is_empty()
    {
        LibSqlEntityRepository::new(conn, item.table)
            .set_sync_status(&item.entity_id, SyncStatus::Synced, None)
            .await?;
    }
    Ok(())
}

impl LocalStore {
    /// Queue a mutation for the next push.
    pub async fn enqueue(&self, item: SyncQueueItem) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = enqueue_locked(conn, item).await;
        finish(conn, outcome).await
    }

    /// Every queued item, oldest first.
    pub async fn get_queue(&self) -> Result<Vec<SyncQueueItem>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).list().await
    }

    /// Remove an item, returning whether it was queued.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).remove(id).await
    }

    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).count().await
    }

    /// Record a failed attempt, dropping the item once it has failed
    /// `max_retries` times.
    pub async fn increment_retry(&self, id: &str, error: &str) -> Result<RetryOutcome> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = self.increment_retry_locked(conn, id, error).await;
        finish(conn, outcome).await
    }

    async fn increment_retry_locked(
        &self,
        conn: &Connection,
        id: &str,
        error: &str,
    ) -> Result<RetryOutcome> {
        let repo = LibSqlQueueRepository::new(conn);
        let Some(retry_count) = repo.increment_retry(id, error).await? else {
            return Ok(RetryOutcome::Missing);
        };
        if retry_count < self.max_retries {
            return Ok(RetryOutcome::Retrying(retry_count));
        }

        if let Some(item) = repo.get(id).await? {
            tracing::warn!(
                "Dropping {} {}/{} after {} failed attempts: {}",
                item.operation,
                item.table,
                item.entity_id,
                retry_count,
                error
            );
            release_locked(conn, &item).await?;
        }
        Ok(RetryOutcome::Dropped(retry_count))
    }

    /// Drop an item without retrying, e.g. after the remote rejected it as
    /// malformed.
    pub async fn drop_item(&self, id: &str, reason: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let Some(item) = LibSqlQueueRepository::new(conn).get(id).await? else {
            return Ok(false);
        };
        tracing::warn!(
            "Dropping {} {}/{} without retry: {}",
            item.operation,
            item.table,
            item.entity_id,
            reason
        );
        begin(conn).await?;
        let outcome = release_locked(conn, &item).await;
        finish(conn, outcome).await?;
        Ok(true)
    }
}
