use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use stride_core::models::Table;
use stride_core::remote::{Mutation, QueryFilter, RemoteAck, RemoteRecord, RemoteResult};
use stride_core::util::unix_millis_now;
use stride_core::{
    HttpRemoteApi, RemoteApi, RemoteConfig, RemoteError, SyncConfig, SyncConflict, SyncEngine,
};

use crate::error::CliError;

pub const DB_PATH_ENV: &str = "STRIDE_DB_PATH";

/// Remote used by the CLI: the HTTP API when configured, otherwise nothing.
///
/// Without a remote every write is queued locally and pushed by the first
/// `stride sync` after `STRIDE_API_URL` is set.
#[derive(Debug)]
pub enum CliRemote {
    Http(HttpRemoteApi),
    Unconfigured,
}

impl CliRemote {
    pub fn from_env() -> Result<Self, CliError> {
        match RemoteConfig::from_env()? {
            Some(config) => Ok(Self::Http(HttpRemoteApi::new(config)?)),
            None => Ok(Self::Unconfigured),
        }
    }

    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

fn unconfigured() -> RemoteError {
    RemoteError::Transient("no remote API configured".to_string())
}

impl RemoteApi for CliRemote {
    async fn query(&self, table: Table, filter: &QueryFilter) -> RemoteResult<Vec<RemoteRecord>> {
        match self {
            Self::Http(api) => api.query(table, filter).await,
            Self::Unconfigured => Err(unconfigured()),
        }
    }

    async fn mutate(&self, mutation: &Mutation) -> RemoteResult<RemoteAck> {
        match self {
            Self::Http(api) => api.mutate(mutation).await,
            Self::Unconfigured => Err(unconfigured()),
        }
    }

    async fn fetch_blob(&self, url: &str) -> RemoteResult<Vec<u8>> {
        match self {
            Self::Http(api) => api.fetch_blob(url).await,
            Self::Unconfigured => Err(unconfigured()),
        }
    }
}

pub type Engine = SyncEngine<CliRemote>;

/// Open the engine over `db_path`, using the remote configured in the
/// environment.
pub async fn open_engine(db_path: &Path) -> Result<Engine, CliError> {
    open_engine_with(db_path, CliRemote::from_env()?).await
}

pub async fn open_engine_with(db_path: &Path, remote: CliRemote) -> Result<Engine, CliError> {
    let configured = remote.is_configured();
    let engine = SyncEngine::open_path(db_path, Arc::new(remote), SyncConfig::default()).await?;
    if !configured {
        engine.set_online(false);
    }
    Ok(engine)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stride")
        .join("stride.db")
}

/// Trimmed value, rejecting blanks.
pub fn require_text(value: &str, field: &'static str) -> Result<String, CliError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyValue(field))
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: String,
    pub table: String,
    pub entity_id: String,
    pub operation: String,
    pub remote_deleted: bool,
    pub detected_at: i64,
    pub detected_at_iso: String,
    pub resolved: bool,
    pub local_data: serde_json::Value,
    pub remote_data: Option<serde_json::Value>,
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id.clone(),
        table: conflict.entity_type.to_string(),
        entity_id: conflict.entity_id.clone(),
        operation: conflict.operation.to_string(),
        remote_deleted: conflict.remote_deleted(),
        detected_at: conflict.timestamp,
        detected_at_iso: format_sync_timestamp(conflict.timestamp),
        resolved: conflict.resolved,
        local_data: conflict.local_data.clone(),
        remote_data: conflict.remote_data.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    let now_ms = unix_millis_now();
    conflicts
        .iter()
        .map(|conflict| {
            let remote = if conflict.remote_deleted() {
                "deleted".to_string()
            } else {
                conflict
                    .remote_version
                    .map_or_else(|| "changed".to_string(), |version| format!("v{version}"))
            };
            let state = if conflict.resolved { "resolved" } else { "open" };
            format!(
                "{}  {:<8}  {}/{}  {} remote={}  {}",
                short_id(&conflict.id),
                state,
                conflict.entity_type,
                conflict.entity_id,
                conflict.operation,
                remote,
                format_relative_time(conflict.timestamp, now_ms)
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
