//! Typed entity access and the bookkeeping transitions driven by sync.

use std::collections::{HashMap, HashSet};

use libsql::Connection;
use serde_json::Value;

use super::{begin, finish, queue, LocalStore};
use crate::db::{
    EntityRepository, EntityRow, LibSqlEntityRepository, LibSqlQueueRepository, QueueRepository,
};
use crate::models::{
    new_local_id, Entity, EntityIndex, SyncOperation, SyncQueueItem, SyncStatus, Table,
};
use crate::remote::{RemoteAck, RemoteRecord};
use crate::Result;

/// Outcome of merging a remote snapshot into one table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Rows inserted or changed
    pub upserted: usize,
    /// Rows already identical to the remote copy
    pub unchanged: usize,
    /// Rows kept because they hold unpushed or conflicting local edits
    pub skipped: usize,
    /// Synced rows removed because the remote no longer has them
    pub removed: usize,
}

fn decode<E: Entity>(row: EntityRow) -> Result<E> {
    Ok(serde_json::from_value(row.data)?)
}

fn decode_all<E: Entity>(rows: Vec<EntityRow>) -> Result<Vec<E>> {
    rows.into_iter().map(decode).collect()
}

/// Set the `id` field of a JSON document.
pub(super) fn set_document_id(data: &mut Value, id: &str) {
    if let Some(object) = data.as_object_mut() {
        object.insert("id".to_string(), Value::from(id));
    }
}

impl LocalStore {
    /// All records of `E`, ordered by id.
    pub async fn get_all<E: Entity>(&self) -> Result<Vec<E>> {
        let db = self.db.lock().await;
        let rows = LibSqlEntityRepository::new(db.connection(), E::TABLE)
            .list()
            .await?;
        decode_all(rows)
    }

    /// Records of `E` matching `filter`.
    pub async fn get_where<E: Entity>(&self, filter: impl Fn(&E) -> bool) -> Result<Vec<E>> {
        Ok(self
            .get_all::<E>()
            .await?
            .into_iter()
            .filter(|entity| filter(entity))
            .collect())
    }

    /// Records of `E` whose secondary index equals `key`.
    pub async fn get_by_index<E: Entity>(&self, index: EntityIndex, key: &str) -> Result<Vec<E>> {
        let db = self.db.lock().await;
        let rows = LibSqlEntityRepository::new(db.connection(), E::TABLE)
            .list_by_index(index, key)
            .await?;
        decode_all(rows)
    }

    pub async fn get<E: Entity>(&self, id: &str) -> Result<Option<E>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), E::TABLE)
            .get(id)
            .await?
            .map(decode)
            .transpose()
    }

    /// Raw domain document of a record, if it exists.
    pub async fn document(&self, table: Table, id: &str) -> Result<Option<Value>> {
        let db = self.db.lock().await;
        Ok(LibSqlEntityRepository::new(db.connection(), table)
            .get(id)
            .await?
            .map(|row| row.data))
    }

    /// Local sync status of a record, if it exists.
    pub async fn sync_status(&self, table: Table, id: &str) -> Result<Option<SyncStatus>> {
        let db = self.db.lock().await;
        Ok(LibSqlEntityRepository::new(db.connection(), table)
            .get(id)
            .await?
            .map(|row| row.sync_status))
    }

    /// Remote version the local copy was last synced at.
    pub async fn remote_version(&self, table: Table, id: &str) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        Ok(LibSqlEntityRepository::new(db.connection(), table)
            .get(id)
            .await?
            .and_then(|row| row.remote_version))
    }

    /// Upsert a record.
    ///
    /// Offline writes are marked `pending` and queued as a create when the
    /// record is new locally, an update otherwise. Online writes are marked
    /// `synced` and queue nothing.
    pub async fn save<E: Entity>(&self, entity: &E, offline: bool) -> Result<()> {
        entity.validate()?;
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = self.save_locked(conn, entity, offline).await;
        finish(conn, outcome).await
    }

    /// Insert a new record, assigning a local id when it has none.
    pub async fn save_new<E: Entity>(&self, mut entity: E, offline: bool) -> Result<E> {
        if entity.id().trim().is_empty() {
            entity.set_id(new_local_id());
        }
        if self.get::<E>(entity.id()).await?.is_some() {
            return Err(crate::Error::InvalidInput(format!(
                "{} {} already exists",
                E::TABLE,
                entity.id()
            )));
        }
        self.save(&entity, offline).await?;
        Ok(entity)
    }

    async fn save_locked<E: Entity>(
        &self,
        conn: &Connection,
        entity: &E,
        offline: bool,
    ) -> Result<()> {
        let repo = LibSqlEntityRepository::new(conn, E::TABLE);
        let existing = repo.get(entity.id()).await?;
        let remote_version = existing.as_ref().and_then(|row| row.remote_version);
        let data = serde_json::to_value(entity)?;
        let now = self.now();

        repo.upsert(&EntityRow {
            id: entity.id().to_string(),
            parent_id: entity.parent_id().map(str::to_string),
            date: entity.date().map(str::to_string),
            data: data.clone(),
            last_modified: now,
            offline,
            sync_status: if offline {
                SyncStatus::Pending
            } else {
                SyncStatus::Synced
            },
            remote_version,
        })
        .await?;

        if offline {
            let operation = if existing.is_some() {
                SyncOperation::Update
            } else {
                SyncOperation::Create
            };
            let item =
                SyncQueueItem::new(operation, E::TABLE, entity.id(), data, remote_version, now);
            queue::enqueue_locked(conn, item).await?;
        }
        Ok(())
    }

    /// Remove a record, queueing a delete when offline.
    ///
    /// Returns whether the record existed.
    pub async fn delete<E: Entity>(&self, id: &str, offline: bool) -> Result<bool> {
        self.delete_in(E::TABLE, id, offline).await
    }

    async fn delete_in(&self, table: Table, id: &str, offline: bool) -> Result<bool> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = self.delete_locked(conn, table, id, offline).await;
        finish(conn, outcome).await
    }

    async fn delete_locked(
        &self,
        conn: &Connection,
        table: Table,
        id: &str,
        offline: bool,
    ) -> Result<bool> {
        let repo = LibSqlEntityRepository::new(conn, table);
        let Some(existing) = repo.get(id).await? else {
            return Ok(false);
        };
        repo.delete(id).await?;
        if offline {
            let item = SyncQueueItem::new(
                SyncOperation::Delete,
                table,
                id,
                existing.data,
                existing.remote_version,
                self.now(),
            );
            queue::enqueue_locked(conn, item).await?;
        } else {
            queue::drop_entity_items(conn, table, id).await?;
        }
        Ok(true)
    }

    /// Upsert domain records as `synced`, one transaction for the table.
    ///
    /// Rows holding unpushed or conflicting local edits are left untouched.
    pub async fn bulk_merge<E: Entity>(&self, records: &[E]) -> Result<MergeStats> {
        let documents = records
            .iter()
            .map(|record| Ok((record.id().to_string(), serde_json::to_value(record)?, None)))
            .collect::<Result<Vec<_>>>()?;
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = self.merge_locked(conn, E::TABLE, documents, false).await;
        finish(conn, outcome).await
    }

    /// Merge a full remote snapshot of `table`.
    ///
    /// Besides upserting, synced rows missing from the snapshot are removed.
    pub async fn merge_remote(&self, table: Table, records: &[RemoteRecord]) -> Result<MergeStats> {
        let documents = records
            .iter()
            .map(|record| (record.id.clone(), record.data.clone(), Some(record.version)))
            .collect();
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = self.merge_locked(conn, table, documents, true).await;
        finish(conn, outcome).await
    }

    async fn merge_locked(
        &self,
        conn: &Connection,
        table: Table,
        documents: Vec<(String, Value, Option<i64>)>,
        prune_missing: bool,
    ) -> Result<MergeStats> {
        let repo = LibSqlEntityRepository::new(conn, table);
        let mut existing: HashMap<String, EntityRow> = repo
            .list()
            .await?
            .into_iter()
            .map(|row| (row.id.clone(), row))
            .collect();
        let queued_deletes: HashSet<String> = LibSqlQueueRepository::new(conn)
            .list()
            .await?
            .into_iter()
            .filter(|item| item.table == table && item.operation == SyncOperation::Delete)
            .map(|item| item.entity_id)
            .collect();
        let mut seen = HashSet::with_capacity(documents.len());
        let mut stats = MergeStats::default();
        let now = self.now();

        for (id, mut data, version) in documents {
            set_document_id(&mut data, &id);
            seen.insert(id.clone());
            if queued_deletes.contains(&id) {
                stats.skipped += 1;
                continue;
            }
            let previous = existing.remove(&id);
            if let Some(row) = &previous {
                if row.sync_status != SyncStatus::Synced {
                    stats.skipped += 1;
                    continue;
                }
                let version = version.or(row.remote_version);
                if row.data == data && row.remote_version == version && !row.offline {
                    stats.unchanged += 1;
                    continue;
                }
            }

            let (parent_id, date) = table.index_values(&data);
            repo.upsert(&EntityRow {
                id,
                parent_id,
                date,
                data,
                last_modified: now,
                offline: false,
                sync_status: SyncStatus::Synced,
                remote_version: version.or_else(|| previous.and_then(|row| row.remote_version)),
            })
            .await?;
            stats.upserted += 1;
        }

        if prune_missing {
            for (id, row) in existing {
                if row.sync_status == SyncStatus::Synced && !seen.contains(&id) {
                    repo.delete(&id).await?;
                    stats.removed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Make the local copy match the remote one, discarding queued work for
    /// the entity. `None` means the remote copy is gone.
    pub async fn accept_remote(
        &self,
        table: Table,
        id: &str,
        record: Option<&RemoteRecord>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = self.accept_remote_locked(conn, table, id, record).await;
        finish(conn, outcome).await
    }

    async fn accept_remote_locked(
        &self,
        conn: &Connection,
        table: Table,
        id: &str,
        record: Option<&RemoteRecord>,
    ) -> Result<()> {
        let repo = LibSqlEntityRepository::new(conn, table);
        queue::drop_entity_items(conn, table, id).await?;
        let Some(record) = record else {
            repo.delete(id).await?;
            return Ok(());
        };
        if record.id != id {
            promote_id(conn, table, id, &record.id).await?;
        }

        let mut data = record.data.clone();
        set_document_id(&mut data, &record.id);
        let (parent_id, date) = table.index_values(&data);
        repo.upsert(&EntityRow {
            id: record.id.clone(),
            parent_id,
            date,
            data,
            last_modified: self.now(),
            offline: false,
            sync_status: SyncStatus::Synced,
            remote_version: Some(record.version),
        })
        .await
    }

    /// Record a successful push of `item`.
    ///
    /// Removes the queue item and marks the record synced at the acknowledged
    /// version. A create acknowledged under a different id promotes the record,
    /// its queued follow-ups and its children to the canonical id. When the
    /// item was rewritten by a local edit while in flight, it stays queued as an
    /// update based on the new version instead.
    pub async fn complete_push(&self, item: &SyncQueueItem, ack: &RemoteAck) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = self.complete_push_locked(conn, item, ack).await;
        finish(conn, outcome).await
    }

    async fn complete_push_locked(
        &self,
        conn: &Connection,
        item: &SyncQueueItem,
        ack: &RemoteAck,
    ) -> Result<()> {
        let queue_repo = LibSqlQueueRepository::new(conn);
        let entities = LibSqlEntityRepository::new(conn, item.table);
        let current = queue_repo.get(&item.id).await?;
        let superseded = current
            .as_ref()
            .is_some_and(|queued| queued.operation != item.operation || queued.payload != item.payload);

        if item.operation != SyncOperation::Delete && ack.id != item.entity_id {
            promote_id(conn, item.table, &item.entity_id, &ack.id).await?;
        }

        // A local delete folded the in-flight create away; the remote copy
        // now exists and has to be deleted in turn.
        let deleted_in_flight = current.is_none()
            && item.operation == SyncOperation::Create
            && entities.get(&ack.id).await?.is_none()
            && queue_repo
                .list_for_entity(item.table, &ack.id)
                .await?
                .is_empty();
        if deleted_in_flight {
            tracing::debug!(
                "{}/{} was deleted while its create was in flight",
                item.table,
                ack.id
            );
            let mut payload = item.payload.clone();
            set_document_id(&mut payload, &ack.id);
            let delete = SyncQueueItem::new(
                SyncOperation::Delete,
                item.table,
                &ack.id,
                payload,
                Some(ack.version),
                self.now(),
            );
            return queue_repo.insert(&delete).await;
        }

        match current {
            Some(mut queued) if superseded => {
                if queued.operation == SyncOperation::Create {
                    queued.operation = SyncOperation::Update;
                }
                queued.base_version = Some(ack.version);
                queued.entity_id.clone_from(&ack.id);
                set_document_id(&mut queued.payload, &ack.id);
                queue_repo.replace(&queued).await?;
                if queued.operation != SyncOperation::Delete {
                    entities
                        .set_sync_status(&ack.id, SyncStatus::Pending, Some(ack.version))
                        .await?;
                }
            }
            _ => {
                queue_repo.remove(&item.id).await?;
                if item.operation != SyncOperation::Delete {
                    entities
                        .set_sync_status(&ack.id, SyncStatus::Synced, Some(ack.version))
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Flag a record as conflicting.
    pub async fn mark_conflict(&self, table: Table, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), table)
            .set_sync_status(id, SyncStatus::Conflict, None)
            .await
    }

    /// Row counts per sync status for `table`.
    pub async fn count_by_status(&self, table: Table) -> Result<Vec<(SyncStatus, usize)>> {
        let db = self.db.lock().await;
        LibSqlEntityRepository::new(db.connection(), table)
            .count_by_status()
            .await
    }
}

/// Re-key a record to its canonical id, carrying its children and queued work.
async fn promote_id(conn: &Connection, table: Table, old_id: &str, new_id: &str) -> Result<()> {
    tracing::debug!("Promoting {}/{} to canonical id {}", table, old_id, new_id);
    LibSqlEntityRepository::new(conn, table)
        .rename(old_id, new_id)
        .await?;

    let queue_repo = LibSqlQueueRepository::new(conn);
    for mut queued in queue_repo.list_for_entity(table, old_id).await? {
        queued.entity_id = new_id.to_string();
        set_document_id(&mut queued.payload, new_id);
        queue_repo.replace(&queued).await?;
    }

    let Some(child) = table.child() else {
        return Ok(());
    };
    let Some(field) = child.parent_field() else {
        return Ok(());
    };
    LibSqlEntityRepository::new(conn, child)
        .reparent(field, old_id, new_id)
        .await?;
    for mut queued in queue_repo.list().await? {
        if queued.table != child || queued.payload.get(field) != Some(&Value::from(old_id)) {
            continue;
        }
        if let Some(object) = queued.payload.as_object_mut() {
            object.insert(field.to_string(), Value::from(new_id));
        }
        queue_repo.replace(&queued).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Collection, Run, Shoe};
    use crate::store::tests::store_at;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(id: &str, version: i64, data: Value) -> RemoteRecord {
        RemoteRecord {
            id: id.to_string(),
            version,
            data,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_save_marks_pending_and_queues_create() {
        let (store, _) = store_at(1_000).await;
        let collection = Collection::new("Road");
        store.save(&collection, true).await.unwrap();

        assert_eq!(
            store.sync_status(Table::Collections, &collection.id).await.unwrap(),
            Some(SyncStatus::Pending)
        );
        let queue = store.get_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].operation, SyncOperation::Create);
        assert_eq!(queue[0].timestamp, 1_000);
        assert_eq!(store.get::<Collection>(&collection.id).await.unwrap(), Some(collection));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn online_save_is_synced_without_queue() {
        let (store, _) = store_at(1).await;
        let collection = Collection::new("Trail");
        store.save(&collection, false).await.unwrap();

        assert_eq!(
            store.sync_status(Table::Collections, &collection.id).await.unwrap(),
            Some(SyncStatus::Synced)
        );
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_rejects_invalid_records() {
        let (store, _) = store_at(1).await;
        let err = store.save(&Collection::new("  "), true).await.unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_new_assigns_id_and_refuses_duplicates() {
        let (store, _) = store_at(1).await;
        let mut collection = Collection::new("Race");
        collection.id = String::new();
        let saved = store.save_new(collection, true).await.unwrap();
        assert!(!saved.id.is_empty());
        assert!(store.save_new(saved, true).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn index_and_filter_queries() {
        let (store, _) = store_at(1).await;
        let road = Run::new("shoe-a", "2024-05-01", 10.0);
        let long = Run::new("shoe-a", "2024-05-02", 32.0);
        let other = Run::new("shoe-b", "2024-05-01", 5.0);
        for run in [&road, &long, &other] {
            store.save(run, true).await.unwrap();
        }

        let by_shoe: Vec<Run> = store
            .get_by_index(EntityIndex::Parent, "shoe-a")
            .await
            .unwrap();
        assert_eq!(by_shoe.len(), 2);

        let by_date: Vec<Run> = store
            .get_by_index(EntityIndex::Date, "2024-05-01")
            .await
            .unwrap();
        assert_eq!(by_date.len(), 2);

        let long_runs = store
            .get_where::<Run>(|run| run.distance_km > 20.0)
            .await
            .unwrap();
        assert_eq!(long_runs, vec![long]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_delete_queues_delete_for_synced_record() {
        let (store, _) = store_at(1).await;
        store
            .merge_remote(
                Table::Collections,
                &[record("c1", 3, json!({ "name": "Road", "created_at": 1 }))],
            )
            .await
            .unwrap();

        assert!(store.delete::<Collection>("c1", true).await.unwrap());
        assert!(store.get::<Collection>("c1").await.unwrap().is_none());

        let queue = store.get_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].operation, SyncOperation::Delete);
        assert_eq!(queue[0].base_version, Some(3));
        assert!(!store.delete::<Collection>("c1", true).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn bulk_merge_twice_is_idempotent() {
        let (store, clock) = store_at(1).await;
        let collections = vec![Collection::new("Road"), Collection::new("Trail")];

        let first = store.bulk_merge(&collections).await.unwrap();
        assert_eq!(first.upserted, 2);
        let snapshot = store.get_all::<Collection>().await.unwrap();
        let statuses = store.count_by_status(Table::Collections).await.unwrap();

        clock.advance(60_000);
        let second = store.bulk_merge(&collections).await.unwrap();
        assert_eq!(second.upserted, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(store.get_all::<Collection>().await.unwrap(), snapshot);
        assert_eq!(store.count_by_status(Table::Collections).await.unwrap(), statuses);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn merge_keeps_pending_rows_and_prunes_missing_synced_rows() {
        let (store, _) = store_at(1).await;
        store
            .merge_remote(
                Table::Collections,
                &[
                    record("keep", 1, json!({ "name": "Keep", "created_at": 1 })),
                    record("gone", 2, json!({ "name": "Gone", "created_at": 1 })),
                ],
            )
            .await
            .unwrap();

        let mut edited = store.get::<Collection>("keep").await.unwrap().unwrap();
        edited.name = "Edited offline".to_string();
        store.save(&edited, true).await.unwrap();

        let stats = store
            .merge_remote(
                Table::Collections,
                &[record("keep", 5, json!({ "name": "Remote", "created_at": 1 }))],
            )
            .await
            .unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.removed, 1);
        assert_eq!(
            store.get::<Collection>("keep").await.unwrap().unwrap().name,
            "Edited offline"
        );
        assert!(store.get::<Collection>("gone").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn complete_push_marks_synced_and_removes_item() {
        let (store, _) = store_at(1).await;
        let collection = Collection::new("Road");
        store.save(&collection, true).await.unwrap();
        let item = store.get_queue().await.unwrap().remove(0);

        store
            .complete_push(
                &item,
                &RemoteAck {
                    id: collection.id.clone(),
                    version: 7,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            store.sync_status(Table::Collections, &collection.id).await.unwrap(),
            Some(SyncStatus::Synced)
        );
        assert_eq!(
            store.remote_version(Table::Collections, &collection.id).await.unwrap(),
            Some(7)
        );
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn complete_push_promotes_id_and_children() {
        let (store, _) = store_at(1).await;
        let collection = Collection::new("Road");
        store.save(&collection, true).await.unwrap();
        let shoe = Shoe::new(&collection.id, "Nike", "Pegasus");
        store.save(&shoe, true).await.unwrap();

        let item = store
            .get_queue()
            .await
            .unwrap()
            .into_iter()
            .find(|item| item.table == Table::Collections)
            .unwrap();
        store
            .complete_push(
                &item,
                &RemoteAck {
                    id: "srv-1".to_string(),
                    version: 1,
                },
            )
            .await
            .unwrap();

        assert!(store.get::<Collection>(&collection.id).await.unwrap().is_none());
        let promoted = store.get::<Collection>("srv-1").await.unwrap().unwrap();
        assert_eq!(promoted.name, "Road");

        let stored_shoe = store.get::<Shoe>(&shoe.id).await.unwrap().unwrap();
        assert_eq!(stored_shoe.collection_id, "srv-1");
        let queued_shoe = store.get_queue().await.unwrap().remove(0);
        assert_eq!(queued_shoe.payload["collection_id"], json!("srv-1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edit_during_push_stays_queued_as_update() {
        let (store, _) = store_at(1).await;
        let mut collection = Collection::new("Road");
        store.save(&collection, true).await.unwrap();
        let in_flight = store.get_queue().await.unwrap().remove(0);

        collection.name = "Road 2".to_string();
        store.save(&collection, true).await.unwrap();

        store
            .complete_push(
                &in_flight,
                &RemoteAck {
                    id: collection.id.clone(),
                    version: 4,
                },
            )
            .await
            .unwrap();

        let queue = store.get_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].operation, SyncOperation::Update);
        assert_eq!(queue[0].base_version, Some(4));
        assert_eq!(queue[0].payload["name"], json!("Road 2"));
        assert_eq!(
            store.sync_status(Table::Collections, &collection.id).await.unwrap(),
            Some(SyncStatus::Pending)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_during_create_push_queues_remote_delete() {
        let (store, _) = store_at(1).await;
        let collection = Collection::new("Road");
        store.save(&collection, true).await.unwrap();
        let in_flight = store.get_queue().await.unwrap().remove(0);

        store
            .delete::<Collection>(&collection.id, true)
            .await
            .unwrap();
        assert_eq!(store.pending_count().await.unwrap(), 0);

        store
            .complete_push(
                &in_flight,
                &RemoteAck {
                    id: "srv-9".to_string(),
                    version: 1,
                },
            )
            .await
            .unwrap();

        let queue = store.get_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].operation, SyncOperation::Delete);
        assert_eq!(queue[0].entity_id, "srv-9");
        assert_eq!(queue[0].base_version, Some(1));

        let stats = store
            .merge_remote(
                Table::Collections,
                &[record("srv-9", 1, json!({ "id": "srv-9", "name": "Road" }))],
            )
            .await
            .unwrap();
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.get::<Collection>("srv-9").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn accept_remote_overwrites_or_removes_local_copy() {
        let (store, _) = store_at(1).await;
        let mut collection = Collection::new("Local");
        store.save(&collection, false).await.unwrap();
        collection.name = "Local edit".to_string();
        store.save(&collection, true).await.unwrap();

        let remote = record(
            &collection.id,
            9,
            json!({ "name": "Remote", "created_at": collection.created_at }),
        );
        store
            .accept_remote(Table::Collections, &collection.id, Some(&remote))
            .await
            .unwrap();
        let stored = store.get::<Collection>(&collection.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Remote");
        assert_eq!(store.pending_count().await.unwrap(), 0);
        assert_eq!(
            store.remote_version(Table::Collections, &collection.id).await.unwrap(),
            Some(9)
        );

        store
            .accept_remote(Table::Collections, &collection.id, None)
            .await
            .unwrap();
        assert!(store.get::<Collection>(&collection.id).await.unwrap().is_none());
    }
}
