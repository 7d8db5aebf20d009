use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stride_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("{0} cannot be empty")]
    EmptyValue(&'static str),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
    #[error("A sync is already running")]
    SyncInProgress,
    #[error("Sync is not configured. Set STRIDE_API_URL (and optionally STRIDE_API_TOKEN) to enable `stride sync`.")]
    SyncNotConfigured,
}
