//! Blob cache repository

use crate::cache::CacheEntryMeta;
use crate::error::Result;
use libsql::{params, Connection};

/// A cached blob with its LRU bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Source URL (cache key)
    pub url: String,
    pub blob: Vec<u8>,
    /// Last access (Unix ms)
    pub timestamp: i64,
    pub size: u64,
}

/// Trait for blob cache storage operations (async)
#[allow(async_fn_in_trait)]
pub trait BlobRepository {
    async fn get(&self, url: &str) -> Result<Option<CacheEntry>>;

    /// Refresh the last-access timestamp
    async fn touch(&self, url: &str, timestamp: i64) -> Result<()>;

    async fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Sizes and access times of every entry, without the blob payloads
    async fn entries(&self) -> Result<Vec<CacheEntryMeta>>;

    async fn delete(&self, url: &str) -> Result<()>;

    async fn total_size(&self) -> Result<u64>;

    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `BlobRepository`
pub struct LibSqlBlobRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlBlobRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn to_size(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or_default()
}

impl BlobRepository for LibSqlBlobRepository<'_> {
    async fn get(&self, url: &str) -> Result<Option<CacheEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, blob, timestamp, size FROM blob_cache WHERE url = ?",
                [url],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(CacheEntry {
                url: row.get(0)?,
                blob: row.get(1)?,
                timestamp: row.get(2)?,
                size: to_size(row.get(3)?),
            })),
            None => Ok(None),
        }
    }

    async fn touch(&self, url: &str, timestamp: i64) -> Result<()> {
        self.conn
            .execute(
                "UPDATE blob_cache SET timestamp = ? WHERE url = ?",
                params![timestamp, url],
            )
            .await?;
        Ok(())
    }

    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO blob_cache (url, blob, size, timestamp) VALUES (?, ?, ?, ?)",
                params![
                    entry.url.as_str(),
                    entry.blob.clone(),
                    i64::try_from(entry.size).unwrap_or(i64::MAX),
                    entry.timestamp
                ],
            )
            .await?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<CacheEntryMeta>> {
        let mut rows = self
            .conn
            .query(
                "SELECT url, size, timestamp FROM blob_cache ORDER BY timestamp ASC",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(CacheEntryMeta {
                url: row.get(0)?,
                size: to_size(row.get(1)?),
                timestamp: row.get(2)?,
            });
        }
        Ok(entries)
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM blob_cache WHERE url = ?", [url])
            .await?;
        Ok(())
    }

    async fn total_size(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COALESCE(SUM(size), 0) FROM blob_cache", ())
            .await?;
        match rows.next().await? {
            Some(row) => Ok(to_size(row.get(0)?)),
            None => Ok(0),
        }
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM blob_cache", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn entry(url: &str, size: usize, timestamp: i64) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            blob: vec![7; size],
            timestamp,
            size: size as u64,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_get_touch() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlBlobRepository::new(db.connection());

        repo.put(&entry("https://img/a.png", 4, 1)).await.unwrap();
        repo.touch("https://img/a.png", 9).await.unwrap();

        let fetched = repo.get("https://img/a.png").await.unwrap().unwrap();
        assert_eq!(fetched.blob, vec![7; 4]);
        assert_eq!(fetched.timestamp, 9);
        assert_eq!(fetched.size, 4);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_total_size_and_clear() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlBlobRepository::new(db.connection());

        repo.put(&entry("a", 10, 1)).await.unwrap();
        repo.put(&entry("b", 15, 2)).await.unwrap();
        assert_eq!(repo.total_size().await.unwrap(), 25);
        assert_eq!(repo.entries().await.unwrap().len(), 2);

        repo.clear().await.unwrap();
        assert_eq!(repo.total_size().await.unwrap(), 0);
    }
}
