//! JSON metadata and the persisted parts of the sync state.

use libsql::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{begin, finish, LocalStore};
use crate::db::{
    EntityRepository, LibSqlEntityRepository, LibSqlMetadataRepository, LibSqlQueueRepository,
    MetadataRepository, QueueRepository,
};
use crate::models::{SyncConflict, SyncErrorRecord, SyncQueueItem, SyncStatus};
use crate::Result;

const LAST_SYNC_KEY: &str = "last_sync_time";
const ERRORS_KEY: &str = "sync_errors";
const CONFLICTS_KEY: &str = "sync_conflicts";

async fn read_json<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>> {
    match LibSqlMetadataRepository::new(conn).get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

async fn write_json<T: Serialize + ?Sized>(conn: &Connection, key: &str, value: &T) -> Result<()> {
    LibSqlMetadataRepository::new(conn)
        .set(key, &serde_json::to_string(value)?)
        .await
}

impl LocalStore {
    /// Load a metadata value stored as JSON.
    pub async fn get_metadata<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let db = self.db.lock().await;
        read_json(db.connection(), key).await
    }

    /// Store a metadata value as JSON.
    pub async fn set_metadata<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let db = self.db.lock().await;
        write_json(db.connection(), key, value).await
    }

    pub async fn remove_metadata(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlMetadataRepository::new(db.connection())
            .remove(key)
            .await
    }

    /// Time of the last completed sync cycle (Unix ms).
    pub async fn last_sync(&self) -> Result<Option<i64>> {
        self.get_metadata(LAST_SYNC_KEY).await
    }

    pub async fn set_last_sync(&self, timestamp: i64) -> Result<()> {
        self.set_metadata(LAST_SYNC_KEY, &timestamp).await
    }

    pub async fn sync_errors(&self) -> Result<Vec<SyncErrorRecord>> {
        Ok(self.get_metadata(ERRORS_KEY).await?.unwrap_or_default())
    }

    /// Append an error, keeping only the newest `cap` records.
    pub async fn push_sync_error(&self, record: SyncErrorRecord, cap: usize) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let mut errors: Vec<SyncErrorRecord> =
            read_json(conn, ERRORS_KEY).await?.unwrap_or_default();
        errors.push(record);
        let excess = errors.len().saturating_sub(cap);
        errors.drain(..excess);
        write_json(conn, ERRORS_KEY, &errors).await
    }

    pub async fn clear_sync_errors(&self) -> Result<()> {
        self.remove_metadata(ERRORS_KEY).await
    }

    /// Every recorded conflict, resolved ones included.
    pub async fn conflicts(&self) -> Result<Vec<SyncConflict>> {
        Ok(self.get_metadata(CONFLICTS_KEY).await?.unwrap_or_default())
    }

    pub async fn conflict(&self, id: &str) -> Result<Option<SyncConflict>> {
        Ok(self
            .conflicts()
            .await?
            .into_iter()
            .find(|conflict| conflict.id == id))
    }

    /// Take a rejected item out of the queue and persist its conflict.
    ///
    /// An unresolved conflict already recorded for the same entity is replaced.
    pub async fn park_conflict(
        &self,
        item: &SyncQueueItem,
        conflict: SyncConflict,
    ) -> Result<SyncConflict> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = park_conflict_locked(conn, item, conflict).await;
        finish(conn, outcome).await
    }

    /// Persist a conflict that did not come from a queued item.
    pub async fn record_conflict(&self, conflict: SyncConflict) -> Result<SyncConflict> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = store_conflict_locked(conn, conflict).await;
        finish(conn, outcome).await
    }

    /// Mark a conflict resolved. Returns false when no such conflict exists.
    pub async fn mark_conflict_resolved(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let mut conflicts: Vec<SyncConflict> =
            read_json(conn, CONFLICTS_KEY).await?.unwrap_or_default();
        let Some(conflict) = conflicts.iter_mut().find(|conflict| conflict.id == id) else {
            return Ok(false);
        };
        conflict.resolved = true;
        write_json(conn, CONFLICTS_KEY, &conflicts).await?;
        Ok(true)
    }

    /// Forget resolved conflicts, returning how many were removed.
    pub async fn clear_resolved_conflicts(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let mut conflicts: Vec<SyncConflict> =
            read_json(conn, CONFLICTS_KEY).await?.unwrap_or_default();
        let before = conflicts.len();
        conflicts.retain(|conflict| !conflict.resolved);
        write_json(conn, CONFLICTS_KEY, &conflicts).await?;
        Ok(before - conflicts.len())
    }
}

async fn park_conflict_locked(
    conn: &Connection,
    item: &SyncQueueItem,
    conflict: SyncConflict,
) -> Result<SyncConflict> {
    LibSqlQueueRepository::new(conn).remove(&item.id).await?;
    LibSqlEntityRepository::new(conn, item.table)
        .set_sync_status(&item.entity_id, SyncStatus::Conflict, None)
        .await?;
    store_conflict_locked(conn, conflict).await
}

async fn store_conflict_locked(conn: &Connection, conflict: SyncConflict) -> Result<SyncConflict> {
    let mut conflicts: Vec<SyncConflict> =
        read_json(conn, CONFLICTS_KEY).await?.unwrap_or_default();
    conflicts.retain(|existing| {
        existing.resolved
            || existing.entity_type != conflict.entity_type
            || existing.entity_id != conflict.entity_id
    });
    conflicts.push(conflict.clone());
    write_json(conn, CONFLICTS_KEY, &conflicts).await?;
    Ok(conflict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Collection, Entity, SyncOperation, Table};
    use crate::store::tests::store_at;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn error(timestamp: i64) -> SyncErrorRecord {
        SyncErrorRecord {
            timestamp,
            message: format!("failure {timestamp}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn metadata_round_trips_json_values() {
        let (store, _) = store_at(1).await;
        store.set_metadata("cursor", &json!({ "page": 2 })).await.unwrap();
        let value: Option<serde_json::Value> = store.get_metadata("cursor").await.unwrap();
        assert_eq!(value, Some(json!({ "page": 2 })));

        store.remove_metadata("cursor").await.unwrap();
        let value: Option<serde_json::Value> = store.get_metadata("cursor").await.unwrap();
        assert_eq!(value, None);

        assert_eq!(store.last_sync().await.unwrap(), None);
        store.set_last_sync(42).await.unwrap();
        assert_eq!(store.last_sync().await.unwrap(), Some(42));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn error_list_is_capped_oldest_first() {
        let (store, _) = store_at(1).await;
        for timestamp in 1..=5 {
            store.push_sync_error(error(timestamp), 3).await.unwrap();
        }
        let errors = store.sync_errors().await.unwrap();
        assert_eq!(errors, vec![error(3), error(4), error(5)]);

        store.clear_sync_errors().await.unwrap();
        assert!(store.sync_errors().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn park_conflict_dequeues_and_flags_record() {
        let (store, _) = store_at(1).await;
        let collection = Collection::new("Road");
        store.save(&collection, true).await.unwrap();
        let item = store.get_queue().await.unwrap().remove(0);

        let conflict = SyncConflict::new(
            Table::Collections,
            collection.id(),
            SyncOperation::Create,
            item.payload.clone(),
            None,
            5,
        );
        let parked = store.park_conflict(&item, conflict).await.unwrap();

        assert_eq!(store.pending_count().await.unwrap(), 0);
        assert_eq!(
            store
                .sync_status(Table::Collections, collection.id())
                .await
                .unwrap(),
            Some(SyncStatus::Conflict)
        );
        assert_eq!(store.conflict(&parked.id).await.unwrap(), Some(parked));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn newer_conflict_replaces_unresolved_one_for_same_entity() {
        let (store, _) = store_at(1).await;
        let first = SyncConflict::new(Table::Runs, "r1", SyncOperation::Update, json!({}), None, 1);
        let second = SyncConflict::new(Table::Runs, "r1", SyncOperation::Update, json!({}), None, 2);
        store.record_conflict(first.clone()).await.unwrap();
        store.record_conflict(second.clone()).await.unwrap();
        assert_eq!(store.conflicts().await.unwrap(), vec![second.clone()]);

        assert!(store.mark_conflict_resolved(&second.id).await.unwrap());
        assert!(!store.mark_conflict_resolved("missing").await.unwrap());
        assert_eq!(store.clear_resolved_conflicts().await.unwrap(), 1);
        assert!(store.conflicts().await.unwrap().is_empty());
    }
}
