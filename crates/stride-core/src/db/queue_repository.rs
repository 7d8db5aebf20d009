//! Sync queue repository

use crate::error::Result;
use crate::models::{SyncQueueItem, Table};
use libsql::{params, Connection, Row};

const COLUMNS: &str =
    "id, operation, table_name, entity_id, payload, base_version, timestamp, retry_count, last_error";

/// Trait for sync queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Append an item
    async fn insert(&self, item: &SyncQueueItem) -> Result<()>;

    /// Replace an existing item's payload, operation and version in place
    async fn replace(&self, item: &SyncQueueItem) -> Result<()>;

    /// All items, oldest first
    async fn list(&self) -> Result<Vec<SyncQueueItem>>;

    /// Items targeting a specific entity, oldest first
    async fn list_for_entity(&self, table: Table, entity_id: &str) -> Result<Vec<SyncQueueItem>>;

    async fn get(&self, id: &str) -> Result<Option<SyncQueueItem>>;

    /// Remove an item, returning whether it existed
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Atomically bump `retry_count`, returning the new count when the item exists
    async fn increment_retry(&self, id: &str, error: &str) -> Result<Option<u32>>;

    async fn count(&self) -> Result<usize>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_item(row: &Row) -> Result<SyncQueueItem> {
        let operation: String = row.get(1)?;
        let table: String = row.get(2)?;
        let payload: String = row.get(4)?;
        let retry_count: i64 = row.get(7)?;
        Ok(SyncQueueItem {
            id: row.get(0)?,
            operation: operation.parse()?,
            table: table.parse()?,
            entity_id: row.get(3)?,
            payload: serde_json::from_str(&payload)?,
            base_version: row.get(5)?,
            timestamp: row.get(6)?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            last_error: row.get(8)?,
        })
    }

    async fn query_items(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<SyncQueueItem>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(Self::parse_item(&row)?);
        }
        Ok(items)
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn insert(&self, item: &SyncQueueItem) -> Result<()> {
        self.conn
            .execute(
                &format!("INSERT INTO sync_queue ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
                params![
                    item.id.as_str(),
                    item.operation.as_str(),
                    item.table.as_str(),
                    item.entity_id.as_str(),
                    serde_json::to_string(&item.payload)?,
                    item.base_version,
                    item.timestamp,
                    i64::from(item.retry_count),
                    item.last_error.clone()
                ],
            )
            .await?;
        Ok(())
    }

    async fn replace(&self, item: &SyncQueueItem) -> Result<()> {
        self.conn
            .execute(
                "UPDATE sync_queue
                 SET operation = ?, entity_id = ?, payload = ?, base_version = ?,
                     retry_count = ?, last_error = ?
                 WHERE id = ?",
                params![
                    item.operation.as_str(),
                    item.entity_id.as_str(),
                    serde_json::to_string(&item.payload)?,
                    item.base_version,
                    i64::from(item.retry_count),
                    item.last_error.clone(),
                    item.id.as_str()
                ],
            )
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SyncQueueItem>> {
        self.query_items(
            &format!("SELECT {COLUMNS} FROM sync_queue ORDER BY timestamp ASC, rowid ASC"),
            (),
        )
        .await
    }

    async fn list_for_entity(&self, table: Table, entity_id: &str) -> Result<Vec<SyncQueueItem>> {
        self.query_items(
            &format!(
                "SELECT {COLUMNS} FROM sync_queue
                 WHERE table_name = ? AND entity_id = ?
                 ORDER BY timestamp ASC, rowid ASC"
            ),
            [table.as_str(), entity_id],
        )
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<SyncQueueItem>> {
        Ok(self
            .query_items(&format!("SELECT {COLUMNS} FROM sync_queue WHERE id = ?"), [id])
            .await?
            .into_iter()
            .next())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?", [id])
            .await?;
        Ok(affected > 0)
    }

    async fn increment_retry(&self, id: &str, error: &str) -> Result<Option<u32>> {
        let mut rows = self
            .conn
            .query(
                "UPDATE sync_queue
                 SET retry_count = retry_count + 1, last_error = ?
                 WHERE id = ?
                 RETURNING retry_count",
                [error, id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => {
                let count: i64 = row.get(0)?;
                Ok(Some(u32::try_from(count).unwrap_or(u32::MAX)))
            }
            None => Ok(None),
        }
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self.conn.query("SELECT COUNT(*) FROM sync_queue", ()).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }
}
