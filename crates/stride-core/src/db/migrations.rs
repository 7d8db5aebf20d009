//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Run `statements` in one transaction, rolling back on the first failure
async fn apply(conn: &Connection, version: i32, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn
        .execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .await
    {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {version} (latest {CURRENT_VERSION})");
    Ok(())
}

/// Migration to version 1: entity tables and the sync queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS collections (
            id TEXT PRIMARY KEY,
            parent_id TEXT,
            date TEXT,
            data TEXT NOT NULL,
            last_modified INTEGER NOT NULL,
            offline INTEGER NOT NULL DEFAULT 0,
            sync_status TEXT NOT NULL,
            remote_version INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_collections_sync_status ON collections(sync_status)",
        "CREATE TABLE IF NOT EXISTS shoes (
            id TEXT PRIMARY KEY,
            parent_id TEXT,
            date TEXT,
            data TEXT NOT NULL,
            last_modified INTEGER NOT NULL,
            offline INTEGER NOT NULL DEFAULT 0,
            sync_status TEXT NOT NULL,
            remote_version INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_shoes_parent_id ON shoes(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_shoes_date ON shoes(date)",
        "CREATE INDEX IF NOT EXISTS idx_shoes_sync_status ON shoes(sync_status)",
        "CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            parent_id TEXT,
            date TEXT,
            data TEXT NOT NULL,
            last_modified INTEGER NOT NULL,
            offline INTEGER NOT NULL DEFAULT 0,
            sync_status TEXT NOT NULL,
            remote_version INTEGER
        )",
        "CREATE INDEX IF NOT EXISTS idx_runs_parent_id ON runs(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_runs_date ON runs(date DESC)",
        "CREATE INDEX IF NOT EXISTS idx_runs_sync_status ON runs(sync_status)",
        "CREATE TABLE IF NOT EXISTS sync_queue (
            id TEXT PRIMARY KEY,
            operation TEXT NOT NULL,
            table_name TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            base_version INTEGER,
            timestamp INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp ON sync_queue(timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_entity ON sync_queue(table_name, entity_id)",
    ];

    apply(conn, 1, &statements).await
}

/// Migration to version 2: metadata and blob cache
async fn migrate_v2(conn: &Connection) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS blob_cache (
            url TEXT PRIMARY KEY,
            blob BLOB NOT NULL,
            size INTEGER NOT NULL,
            timestamp INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_blob_cache_timestamp ON blob_cache(timestamp)",
    ];

    apply(conn, 2, &statements).await
}
