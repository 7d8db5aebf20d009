//! Configuration for the sync orchestrator.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_QUOTA_BYTES;
use crate::models::MAX_RETRY_COUNT;
use crate::{Error, Result};

/// Default interval between scheduled cycles
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Shortest interval the scheduler will tick at
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_millis(10);
/// Default number of queue items pushed concurrently
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Default cap on recorded sync errors
pub const MAX_ERRORS: usize = 20;

/// How a rejected push is reconciled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// Overwrite the remote copy with the local one
    LocalWins,
    /// Replace the local copy with the remote one
    RemoteWins,
    /// Keep both snapshots until resolved explicitly
    #[default]
    Manual,
}

impl ConflictStrategy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalWins => "local-wins",
            Self::RemoteWins => "remote-wins",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local-wins" => Ok(Self::LocalWins),
            "remote-wins" => Ok(Self::RemoteWins),
            "manual" => Ok(Self::Manual),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict strategy: {other}"
            ))),
        }
    }
}

/// Tunables for sync cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Interval between scheduled cycles.
    pub sync_interval: Duration,
    /// Queue items pushed concurrently per batch.
    pub batch_size: usize,
    /// Failed attempts after which a queue item is dropped.
    pub max_retries: u32,
    /// Recorded errors kept for display; older ones are pruned.
    pub max_errors: usize,
    /// Strategy applied to rejected pushes.
    pub strategy: ConflictStrategy,
    /// Blob cache quota in bytes.
    pub cache_quota: u64,
    /// Force a full pull on every cycle.
    pub full_resync: bool,
}

impl SyncConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sync_interval: DEFAULT_SYNC_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: MAX_RETRY_COUNT,
            max_errors: MAX_ERRORS,
            strategy: ConflictStrategy::default(),
            cache_quota: DEFAULT_CACHE_QUOTA_BYTES,
            full_resync: false,
        }
    }

    /// Sets the interval between scheduled cycles (at least
    /// [`MIN_SYNC_INTERVAL`]).
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval.max(MIN_SYNC_INTERVAL);
        self
    }

    /// Sets the push batch size (at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the retry budget (at least 1).
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    #[must_use]
    pub const fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = max_errors;
        self
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_cache_quota(mut self, quota: u64) -> Self {
        self.cache_quota = quota;
        self
    }

    #[must_use]
    pub const fn with_full_resync(mut self, full_resync: bool) -> Self {
        self.full_resync = full_resync;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(300));
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_retries, MAX_RETRY_COUNT);
        assert_eq!(config.strategy, ConflictStrategy::Manual);
        assert!(!config.full_resync);
    }

    #[test]
    fn builder_clamps_degenerate_values() {
        let config = SyncConfig::new()
            .with_batch_size(0)
            .with_max_retries(0)
            .with_strategy(ConflictStrategy::RemoteWins)
            .with_sync_interval(Duration::from_secs(30));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.strategy, ConflictStrategy::RemoteWins);
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(
            SyncConfig::new()
                .with_sync_interval(Duration::ZERO)
                .sync_interval,
            MIN_SYNC_INTERVAL
        );
    }

    #[test]
    fn strategy_parses_kebab_case() {
        for strategy in [
            ConflictStrategy::LocalWins,
            ConflictStrategy::RemoteWins,
            ConflictStrategy::Manual,
        ] {
            assert_eq!(strategy.as_str().parse::<ConflictStrategy>().unwrap(), strategy);
        }
        assert!("newest-wins".parse::<ConflictStrategy>().is_err());
        assert_eq!(
            serde_json::to_string(&ConflictStrategy::LocalWins).unwrap(),
            "\"local-wins\""
        );
    }
}
