//! Local replica shared by the consumer API and the sync orchestrator.
//!
//! Every operation takes the connection lock for its full duration, so the
//! store is the single writer for entities, the queue, metadata and the blob
//! cache. Multi-statement writes run inside one transaction per table.

mod blobs;
mod entities;
mod metadata;
mod queue;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libsql::Connection;
use tokio::sync::Mutex;

use crate::cache::CacheEvictor;
use crate::clock::{Clock, SystemClock};
use crate::db::Database;
use crate::models::MAX_RETRY_COUNT;
use crate::Result;

pub use entities::MergeStats;
pub use queue::RetryOutcome;

/// Thread-safe handle to the local replica
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
    clock: Arc<dyn Clock>,
    evictor: CacheEvictor,
    max_retries: u32,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("LocalStore")
            .field("db_path", &self.db_path)
            .field("evictor", &self.evictor)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    fn from_database(db: Database, db_path: Option<PathBuf>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            db_path,
            clock: Arc::new(SystemClock),
            evictor: CacheEvictor::default(),
            max_retries: MAX_RETRY_COUNT,
        }
    }

    /// Open (or create) the replica at `db_path`.
    ///
    /// A file that is not a database is moved aside and the replica recreated
    /// once; queued work in that file is lost.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable: {}. Quarantining and recreating it.",
                    db_path.display(),
                    error
                );
                quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };
        Ok(Self::from_database(db, Some(db_path)))
    }

    /// Open an in-memory replica (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self::from_database(db, None))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn with_cache_quota(mut self, quota: u64) -> Self {
        self.evictor = CacheEvictor::new(quota);
        self
    }

    /// Failures after which a queue item is dropped.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub(crate) fn now(&self) -> i64 {
        self.clock.now_millis()
    }
}

/// Open a write transaction on `conn`.
async fn begin(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN IMMEDIATE", ()).await?;
    Ok(())
}

/// Commit when `outcome` succeeded, roll back otherwise.
async fn finish<T>(conn: &Connection, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            conn.execute("COMMIT", ()).await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = conn.execute("ROLLBACK", ()).await {
                tracing::warn!("Rollback failed after {}: {}", error, rollback_error);
            }
            Err(error)
        }
    }
}

fn is_corrupted_db_error(error: &crate::Error) -> bool {
    error
        .to_string()
        .to_ascii_lowercase()
        .contains("file is not a database")
}

fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
    if db_path.exists() {
        let timestamp = crate::util::unix_millis_now();
        let file_name = db_path
            .file_name()
            .map_or_else(|| "stride.db".into(), |name| name.to_string_lossy());
        let backup_path = db_path.with_file_name(format!("{file_name}.corrupt-{timestamp}"));
        std::fs::rename(db_path, &backup_path)?;
        tracing::warn!(
            "Moved corrupted local DB file from {} to {}",
            db_path.display(),
            backup_path.display()
        );
    }

    let Some(parent) = db_path.parent() else {
        return Ok(());
    };
    let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
        return Ok(());
    };
    let sidecar_prefix = format!("{base_name}-");

    for entry in std::fs::read_dir(parent)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with(&sidecar_prefix) {
            let path = entry.path();
            std::fs::remove_file(&path)?;
            tracing::warn!("Removed stale local DB sidecar {}", path.display());
        }
    }

    Ok(())
}
