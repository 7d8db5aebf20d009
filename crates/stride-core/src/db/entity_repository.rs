//! Entity table repository
//!
//! Rows are stored as JSON documents with the bookkeeping columns and the
//! secondary index columns broken out, so one implementation serves all three
//! entity tables.

use crate::error::Result;
use crate::models::{EntityIndex, SyncStatus, Table};
use libsql::{params, Connection, Row};

const COLUMNS: &str =
    "id, parent_id, date, data, last_modified, offline, sync_status, remote_version";

/// A stored entity document with its bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    pub id: String,
    pub parent_id: Option<String>,
    pub date: Option<String>,
    /// Domain fields only
    pub data: serde_json::Value,
    pub last_modified: i64,
    pub offline: bool,
    pub sync_status: SyncStatus,
    pub remote_version: Option<i64>,
}

/// Trait for entity storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityRepository {
    /// Get a row by id
    async fn get(&self, id: &str) -> Result<Option<EntityRow>>;

    /// List all rows ordered by id
    async fn list(&self) -> Result<Vec<EntityRow>>;

    /// List rows whose secondary index matches `key`
    async fn list_by_index(&self, index: EntityIndex, key: &str) -> Result<Vec<EntityRow>>;

    /// Insert or replace a row by id
    async fn upsert(&self, row: &EntityRow) -> Result<()>;

    /// Delete a row, returning whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Update bookkeeping after a remote acknowledgement or rejection
    async fn set_sync_status(
        &self,
        id: &str,
        status: SyncStatus,
        remote_version: Option<i64>,
    ) -> Result<bool>;

    /// Re-key a row (and its `id` field) to a new identifier
    async fn rename(&self, old_id: &str, new_id: &str) -> Result<bool>;

    /// Rewrite the parent reference of every child row pointing at `old_parent`
    async fn reparent(&self, field: &str, old_parent: &str, new_parent: &str) -> Result<u64>;

    /// Row counts grouped by sync status
    async fn count_by_status(&self) -> Result<Vec<(SyncStatus, usize)>>;
}

/// libSQL implementation of `EntityRepository`
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
    table: Table,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a new repository for `table` with the given connection
    pub const fn new(conn: &'a Connection, table: Table) -> Self {
        Self { conn, table }
    }

    fn parse_row(row: &Row) -> Result<EntityRow> {
        let data: String = row.get(3)?;
        let sync_status: String = row.get(6)?;
        Ok(EntityRow {
            id: row.get(0)?,
            parent_id: row.get(1)?,
            date: row.get(2)?,
            data: serde_json::from_str(&data)?,
            last_modified: row.get(4)?,
            offline: row.get::<i64>(5)? != 0,
            sync_status: sync_status.parse()?,
            remote_version: row.get(7)?,
        })
    }

    async fn query_rows(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<EntityRow>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(Self::parse_row(&row)?);
        }
        Ok(out)
    }
}

impl EntityRepository for LibSqlEntityRepository<'_> {
    async fn get(&self, id: &str) -> Result<Option<EntityRow>> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = ?", self.table);
        Ok(self.query_rows(&sql, [id]).await?.into_iter().next())
    }

    async fn list(&self) -> Result<Vec<EntityRow>> {
        let sql = format!("SELECT {COLUMNS} FROM {} ORDER BY id", self.table);
        self.query_rows(&sql, ()).await
    }

    async fn list_by_index(&self, index: EntityIndex, key: &str) -> Result<Vec<EntityRow>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE {} = ? ORDER BY id",
            self.table,
            index.column()
        );
        self.query_rows(&sql, [key]).await
    }

    async fn upsert(&self, row: &EntityRow) -> Result<()> {
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        );
        self.conn
            .execute(
                &sql,
                params![
                    row.id.as_str(),
                    row.parent_id.clone(),
                    row.date.clone(),
                    serde_json::to_string(&row.data)?,
                    row.last_modified,
                    i64::from(row.offline),
                    row.sync_status.as_str(),
                    row.remote_version
                ],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let affected = self.conn.execute(&sql, [id]).await?;
        Ok(affected > 0)
    }

    async fn set_sync_status(
        &self,
        id: &str,
        status: SyncStatus,
        remote_version: Option<i64>,
    ) -> Result<bool> {
        let offline = matches!(status, SyncStatus::Pending);
        let sql = format!(
            "UPDATE {} SET sync_status = ?, offline = ?, remote_version = COALESCE(?, remote_version) WHERE id = ?",
            self.table
        );
        let affected = self
            .conn
            .execute(
                &sql,
                params![status.as_str(), i64::from(offline), remote_version, id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn rename(&self, old_id: &str, new_id: &str) -> Result<bool> {
        let Some(mut row) = self.get(old_id).await? else {
            return Ok(false);
        };
        if let Some(object) = row.data.as_object_mut() {
            object.insert("id".to_string(), serde_json::Value::from(new_id));
        }
        row.id = new_id.to_string();
        self.delete(old_id).await?;
        self.upsert(&row).await?;
        Ok(true)
    }

    async fn reparent(&self, field: &str, old_parent: &str, new_parent: &str) -> Result<u64> {
        let mut updated = 0;
        for mut row in self.list_by_index(EntityIndex::Parent, old_parent).await? {
            if let Some(object) = row.data.as_object_mut() {
                object.insert(field.to_string(), serde_json::Value::from(new_parent));
            }
            row.parent_id = Some(new_parent.to_string());
            self.upsert(&row).await?;
            updated += 1;
        }
        Ok(updated)
    }

    async fn count_by_status(&self) -> Result<Vec<(SyncStatus, usize)>> {
        let sql = format!(
            "SELECT sync_status, COUNT(*) FROM {} GROUP BY sync_status ORDER BY sync_status",
            self.table
        );
        let mut rows = self.conn.query(&sql, ()).await?;
        let mut counts = Vec::new();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            counts.push((status.parse()?, usize::try_from(count).unwrap_or_default()));
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn shoe_row(id: &str, parent: &str) -> EntityRow {
        EntityRow {
            id: id.to_string(),
            parent_id: Some(parent.to_string()),
            date: None,
            data: serde_json::json!({"id": id, "collection_id": parent, "brand": "Hoka", "model": "Mach"}),
            last_modified: 1,
            offline: true,
            sync_status: SyncStatus::Pending,
            remote_version: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_upsert_and_get() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection(), Table::Shoes);

        let row = shoe_row("s1", "c1");
        repo.upsert(&row).await.unwrap();

        let fetched = repo.get("s1").await.unwrap().unwrap();
        assert_eq!(fetched, row);
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_by_index() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection(), Table::Shoes);

        repo.upsert(&shoe_row("s1", "c1")).await.unwrap();
        repo.upsert(&shoe_row("s2", "c1")).await.unwrap();
        repo.upsert(&shoe_row("s3", "c2")).await.unwrap();

        let in_c1 = repo.list_by_index(EntityIndex::Parent, "c1").await.unwrap();
        assert_eq!(in_c1.len(), 2);

        let pending = repo
            .list_by_index(EntityIndex::SyncStatus, "pending")
            .await
            .unwrap();
        assert_eq!(pending.len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_sync_status_keeps_version_when_absent() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection(), Table::Shoes);
        repo.upsert(&shoe_row("s1", "c1")).await.unwrap();

        repo.set_sync_status("s1", SyncStatus::Synced, Some(4))
            .await
            .unwrap();
        repo.set_sync_status("s1", SyncStatus::Conflict, None)
            .await
            .unwrap();

        let row = repo.get("s1").await.unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Conflict);
        assert_eq!(row.remote_version, Some(4));
        assert!(!row.offline);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rename_and_reparent() {
        let db = setup().await;
        let shoes = LibSqlEntityRepository::new(db.connection(), Table::Shoes);
        shoes.upsert(&shoe_row("s1", "local-c")).await.unwrap();

        assert!(shoes.rename("s1", "remote-s").await.unwrap());
        let renamed = shoes.get("remote-s").await.unwrap().unwrap();
        assert_eq!(renamed.data["id"], "remote-s");
        assert!(shoes.get("s1").await.unwrap().is_none());

        let moved = shoes
            .reparent("collection_id", "local-c", "remote-c")
            .await
            .unwrap();
        assert_eq!(moved, 1);
        let row = shoes.get("remote-s").await.unwrap().unwrap();
        assert_eq!(row.parent_id.as_deref(), Some("remote-c"));
        assert_eq!(row.data["collection_id"], "remote-c");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_count_by_status() {
        let db = setup().await;
        let repo = LibSqlEntityRepository::new(db.connection(), Table::Shoes);
        repo.upsert(&shoe_row("s1", "c1")).await.unwrap();
        repo.upsert(&shoe_row("s2", "c1")).await.unwrap();
        repo.set_sync_status("s2", SyncStatus::Synced, Some(1))
            .await
            .unwrap();

        let counts = repo.count_by_status().await.unwrap();
        assert_eq!(
            counts,
            vec![(SyncStatus::Pending, 1), (SyncStatus::Synced, 1)]
        );
    }
}
