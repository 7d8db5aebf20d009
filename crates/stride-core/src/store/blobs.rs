//! Size-bounded image cache.

use libsql::Connection;

use super::{begin, finish, LocalStore};
use crate::cache::CacheEntryMeta;
use crate::db::{BlobRepository, CacheEntry, LibSqlBlobRepository};
use crate::Result;

impl LocalStore {
    /// Cache `blob` under `url`, evicting least-recently-used entries first
    /// when the insert would overflow the quota.
    ///
    /// Returns false, caching nothing, when the blob alone exceeds the quota.
    pub async fn cache_blob(&self, url: &str, blob: Vec<u8>) -> Result<bool> {
        let size = u64::try_from(blob.len()).unwrap_or(u64::MAX);
        if self.evictor.exceeds_quota(size) {
            tracing::warn!(
                "Not caching {} ({} bytes exceeds the {} byte quota)",
                url,
                size,
                self.evictor.quota()
            );
            return Ok(false);
        }

        let entry = CacheEntry {
            url: url.to_string(),
            blob,
            timestamp: self.now(),
            size,
        };
        let db = self.db.lock().await;
        let conn = db.connection();
        begin(conn).await?;
        let outcome = self.cache_blob_locked(conn, &entry).await;
        finish(conn, outcome).await?;
        Ok(true)
    }

    async fn cache_blob_locked(&self, conn: &Connection, entry: &CacheEntry) -> Result<()> {
        let repo = LibSqlBlobRepository::new(conn);
        let others: Vec<CacheEntryMeta> = repo
            .entries()
            .await?
            .into_iter()
            .filter(|existing| existing.url != entry.url)
            .collect();
        let total = others.iter().map(|existing| existing.size).sum::<u64>() + entry.size;

        let plan = self.evictor.plan(&others, total);
        if !plan.is_empty() {
            tracing::info!(
                "Evicting {} cached blobs ({} bytes) to make room for {}",
                plan.evict.len(),
                plan.freed_bytes,
                entry.url
            );
            for url in &plan.evict {
                repo.delete(url).await?;
            }
        }
        repo.put(entry).await
    }

    /// Look up a cached blob, refreshing its access time on a hit.
    pub async fn get_cached_blob(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let db = self.db.lock().await;
        let repo = LibSqlBlobRepository::new(db.connection());
        let Some(entry) = repo.get(url).await? else {
            return Ok(None);
        };
        repo.touch(url, self.now()).await?;
        Ok(Some(entry.blob))
    }

    /// Total bytes held by the blob cache.
    pub async fn cache_size(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlBlobRepository::new(db.connection()).total_size().await
    }

    pub async fn clear_cache(&self) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlBlobRepository::new(db.connection()).clear().await
    }
}

#[cfg(test)]
mod tests {
    use crate::store::tests::store_at;
    use crate::store::LocalStore;
    use pretty_assertions::assert_eq;

    async fn small_store() -> (LocalStore, std::sync::Arc<crate::clock::ManualClock>) {
        let (store, clock) = store_at(1).await;
        (store.with_cache_quota(100), clock)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overflow_evicts_least_recently_used() {
        let (store, clock) = small_store().await;
        assert!(store.cache_blob("A", vec![1; 60]).await.unwrap());
        clock.set(2);
        assert!(store.cache_blob("B", vec![2; 50]).await.unwrap());

        assert_eq!(store.get_cached_blob("A").await.unwrap(), None);
        assert_eq!(store.get_cached_blob("B").await.unwrap(), Some(vec![2; 50]));
        assert_eq!(store.cache_size().await.unwrap(), 50);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cache_hit_refreshes_access_time() {
        let (store, clock) = small_store().await;
        store.cache_blob("A", vec![1; 40]).await.unwrap();
        clock.set(2);
        store.cache_blob("B", vec![2; 40]).await.unwrap();
        clock.set(3);
        assert!(store.get_cached_blob("A").await.unwrap().is_some());

        clock.set(4);
        store.cache_blob("C", vec![3; 40]).await.unwrap();
        assert!(store.get_cached_blob("A").await.unwrap().is_some());
        assert_eq!(store.get_cached_blob("B").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn replacing_an_entry_does_not_double_count() {
        let (store, _) = small_store().await;
        store.cache_blob("A", vec![1; 70]).await.unwrap();
        store.cache_blob("A", vec![2; 70]).await.unwrap();
        assert_eq!(store.cache_size().await.unwrap(), 70);
        assert_eq!(store.get_cached_blob("A").await.unwrap(), Some(vec![2; 70]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_blob_is_not_cached() {
        let (store, _) = small_store().await;
        store.cache_blob("A", vec![1; 10]).await.unwrap();
        assert!(!store.cache_blob("huge", vec![0; 101]).await.unwrap());
        assert_eq!(store.cache_size().await.unwrap(), 10);

        store.clear_cache().await.unwrap();
        assert_eq!(store.cache_size().await.unwrap(), 0);
    }
}
