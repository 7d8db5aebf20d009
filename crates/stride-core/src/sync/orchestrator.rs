//! Sync cycles: push, pull, resolve, finalize.
//!
//! At most one cycle runs at a time; a trigger arriving while a cycle is in
//! flight returns [`CycleOutcome::Skipped`] without queueing a follow-up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;

use super::config::{ConflictStrategy, SyncConfig};
use super::listeners::{ListenerHandle, ListenerRegistry};
use super::resolver::ConflictResolver;
use crate::models::{
    SyncConflict, SyncErrorRecord, SyncQueueItem, SyncState, SyncStatusKind, Table,
};
use crate::remote::{Mutation, QueryFilter, RemoteApi, RemoteError};
use crate::store::{LocalStore, MergeStats, RetryOutcome};
use crate::{Error, Result};

/// Summary of a completed cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Queue items acknowledged by the remote
    pub pushed: usize,
    /// Items that failed transiently and stay queued
    pub retried: usize,
    /// Items dropped after exhausting retries or failing validation
    pub dropped: usize,
    /// Conflicts recorded during push
    pub conflicts: usize,
    /// Conflicts resolved automatically this cycle
    pub resolved: usize,
    /// Merge results per table, in merge order
    pub pulled: Vec<(Table, MergeStats)>,
    pub duration: Duration,
}

impl SyncReport {
    /// Records received from the remote across all tables
    pub fn pulled_records(&self) -> usize {
        self.pulled
            .iter()
            .map(|(_, stats)| stats.upserted + stats.unchanged + stats.skipped)
            .sum()
    }
}

/// Result of a sync trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(SyncReport),
    /// Another cycle was already in flight
    Skipped,
    /// The cycle aborted; the error was recorded in the sync state
    Failed(String),
}

/// What happened to one pushed item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushOutcome {
    Pushed,
    Retrying,
    Dropped,
    Conflict { resolved: bool },
}

/// Releases the in-flight flag when the cycle ends, however it ends.
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives sync cycles against a [`RemoteApi`]
pub struct SyncOrchestrator<R> {
    store: LocalStore,
    remote: Arc<R>,
    resolver: ConflictResolver<R>,
    config: SyncConfig,
    listeners: ListenerRegistry,
    in_flight: AtomicBool,
    status: Mutex<SyncStatusKind>,
    full_resync_requested: AtomicBool,
}

impl<R: RemoteApi> SyncOrchestrator<R> {
    pub fn new(store: LocalStore, remote: Arc<R>, config: SyncConfig) -> Self {
        Self {
            resolver: ConflictResolver::new(store.clone(), remote.clone()),
            store,
            remote,
            config,
            listeners: ListenerRegistry::new(),
            in_flight: AtomicBool::new(false),
            status: Mutex::new(SyncStatusKind::Idle),
            full_resync_requested: AtomicBool::new(false),
        }
    }

    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Subscribe to state snapshots published after every transition.
    pub fn add_listener(
        &self,
        listener: impl Fn(&SyncState) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.listeners.add(listener)
    }

    /// Make the next cycle pull everything, even with a recorded last sync.
    pub fn request_full_resync(&self) {
        self.full_resync_requested.store(true, Ordering::Release);
    }

    /// Current state, recomputed from the store.
    pub async fn state(&self) -> Result<SyncState> {
        let live = *self.status.lock();
        let conflicts = self.store.conflicts().await?;
        let has_unresolved = conflicts.iter().any(|conflict| !conflict.resolved);
        let status = match live {
            SyncStatusKind::Syncing | SyncStatusKind::Error => live,
            _ if has_unresolved => SyncStatusKind::Conflict,
            _ => SyncStatusKind::Idle,
        };
        Ok(SyncState {
            status,
            last_sync: self.store.last_sync().await?,
            pending_operations: self.store.pending_count().await?,
            errors: self.store.sync_errors().await?,
            conflicts,
        })
    }

    /// Run a cycle with the configured strategy.
    pub async fn sync_now(&self) -> CycleOutcome {
        self.sync_with(self.config.strategy).await
    }

    /// Run a cycle resolving conflicts with `strategy`.
    pub async fn sync_with(&self, strategy: ConflictStrategy) -> CycleOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.in_flight) else {
            tracing::debug!("Sync already in progress; ignoring trigger");
            return CycleOutcome::Skipped;
        };

        self.set_status(SyncStatusKind::Syncing);
        self.publish().await;

        let outcome = match self.run_cycle(strategy).await {
            Ok(report) => {
                tracing::info!(
                    "Sync complete: {} pushed, {} retrying, {} dropped, {} conflicts, {} pulled in {:?}",
                    report.pushed,
                    report.retried,
                    report.dropped,
                    report.conflicts,
                    report.pulled_records(),
                    report.duration
                );
                self.set_status(SyncStatusKind::Idle);
                CycleOutcome::Completed(report)
            }
            Err(error) => {
                tracing::error!("Sync failed: {}", error);
                self.set_status(SyncStatusKind::Error);
                self.record_error(format!("Sync failed: {error}")).await;
                CycleOutcome::Failed(error.to_string())
            }
        };

        self.publish().await;
        outcome
    }

    async fn run_cycle(&self, strategy: ConflictStrategy) -> Result<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport::default();

        self.push(&mut report, strategy).await?;
        self.pull(&mut report).await?;
        report.resolved += self.resolver.resolve_all(strategy).await?.resolved;

        self.store.set_last_sync(self.store.now()).await?;
        report.duration = started.elapsed();
        Ok(report)
    }

    /// Push queued items one table at a time, parents first.
    ///
    /// The queue is re-read per table so children pick up parent ids the
    /// remote assigned earlier in the same cycle.
    async fn push(&self, report: &mut SyncReport, strategy: ConflictStrategy) -> Result<()> {
        for table in Table::ALL {
            let queue: Vec<SyncQueueItem> = self
                .store
                .get_queue()
                .await?
                .into_iter()
                .filter(|item| item.table == table)
                .collect();
            if queue.is_empty() {
                continue;
            }
            tracing::debug!("Pushing {} queued {} operations", queue.len(), table);

            for batch in queue.chunks(self.config.batch_size.max(1)) {
                let results =
                    join_all(batch.iter().map(|item| self.push_item(item, strategy))).await;
                for (item, result) in batch.iter().zip(results) {
                    match result {
                        Ok(PushOutcome::Pushed) => report.pushed += 1,
                        Ok(PushOutcome::Retrying) => report.retried += 1,
                        Ok(PushOutcome::Dropped) => report.dropped += 1,
                        Ok(PushOutcome::Conflict { resolved }) => {
                            report.conflicts += 1;
                            report.resolved += usize::from(resolved);
                        }
                        Err(error) => {
                            tracing::warn!(
                                "Push of {} {}/{} failed locally: {}",
                                item.operation,
                                item.table,
                                item.entity_id,
                                error
                            );
                            report.retried += 1;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn push_item(
        &self,
        item: &SyncQueueItem,
        strategy: ConflictStrategy,
    ) -> Result<PushOutcome> {
        let mutation = Mutation {
            operation: item.operation,
            table: item.table,
            entity_id: item.entity_id.clone(),
            payload: item.payload.clone(),
            base_version: item.base_version,
        };

        match self.remote.mutate(&mutation).await {
            Ok(ack) => {
                tracing::debug!(
                    "Pushed {} {}/{} (version {})",
                    item.operation,
                    item.table,
                    ack.id,
                    ack.version
                );
                self.store.complete_push(item, &ack).await?;
                Ok(PushOutcome::Pushed)
            }
            Err(RemoteError::Transient(message)) => {
                match self.store.increment_retry(&item.id, &message).await? {
                    RetryOutcome::Retrying(count) => {
                        tracing::debug!(
                            "Push of {}/{} failed (attempt {}): {}",
                            item.table,
                            item.entity_id,
                            count,
                            message
                        );
                        Ok(PushOutcome::Retrying)
                    }
                    RetryOutcome::Dropped(count) => {
                        self.record_error(format!(
                            "Gave up on {} {}/{} after {} attempts: {}",
                            item.operation, item.table, item.entity_id, count, message
                        ))
                        .await;
                        Ok(PushOutcome::Dropped)
                    }
                    RetryOutcome::Missing => Ok(PushOutcome::Retrying),
                }
            }
            Err(RemoteError::Validation(message)) => {
                self.store.drop_item(&item.id, &message).await?;
                self.record_error(format!(
                    "Remote rejected {} {}/{}: {}",
                    item.operation, item.table, item.entity_id, message
                ))
                .await;
                Ok(PushOutcome::Dropped)
            }
            Err(error) => {
                let conflict = self.resolver.capture(item, error).await?;
                let resolved = self.resolve_on_detection(&conflict, strategy).await;
                Ok(PushOutcome::Conflict { resolved })
            }
        }
    }

    async fn resolve_on_detection(
        &self,
        conflict: &SyncConflict,
        strategy: ConflictStrategy,
    ) -> bool {
        let use_local = match strategy {
            ConflictStrategy::Manual => return false,
            ConflictStrategy::LocalWins => true,
            ConflictStrategy::RemoteWins => false,
        };
        match self.resolver.resolve(conflict, use_local).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    "Deferred resolution of {}/{}: {}",
                    conflict.entity_type,
                    conflict.entity_id,
                    error
                );
                false
            }
        }
    }

    /// Fetch all three tables concurrently, then merge them one table at a
    /// time, parents first.
    async fn pull(&self, report: &mut SyncReport) -> Result<()> {
        let full = self.full_resync_requested.swap(false, Ordering::AcqRel)
            || self.config.full_resync
            || self.store.last_sync().await?.is_none();
        if !full {
            // No change feed on the remote: the incremental path is a full pull
            tracing::debug!("Incremental pull requested; performing full pull");
        }

        let (collections, shoes, runs) = tokio::try_join!(
            self.remote.query(Table::Collections, &QueryFilter::All),
            self.remote.query(Table::Shoes, &QueryFilter::All),
            self.remote.query(Table::Runs, &QueryFilter::All),
        )
        .map_err(Error::Remote)?;

        for (table, records) in [
            (Table::Collections, collections),
            (Table::Shoes, shoes),
            (Table::Runs, runs),
        ] {
            let stats = self.store.merge_remote(table, &records).await?;
            tracing::debug!(
                "Merged {}: {} upserted, {} unchanged, {} kept local, {} removed",
                table,
                stats.upserted,
                stats.unchanged,
                stats.skipped,
                stats.removed
            );
            report.pulled.push((table, stats));
        }
        Ok(())
    }

    /// Resolve one conflict explicitly and publish the new state.
    pub async fn resolve_conflict_manually(
        &self,
        conflict_id: &str,
        use_local: bool,
    ) -> Result<SyncConflict> {
        let conflict = self
            .store
            .conflict(conflict_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("conflict {conflict_id}")))?;
        if conflict.resolved {
            return Err(Error::InvalidInput(format!(
                "conflict {conflict_id} is already resolved"
            )));
        }

        self.resolver.resolve(&conflict, use_local).await?;
        self.publish().await;
        Ok(SyncConflict {
            resolved: true,
            ..conflict
        })
    }

    /// Forget recorded errors, leaving the error status if set.
    pub async fn clear_sync_errors(&self) -> Result<()> {
        self.store.clear_sync_errors().await?;
        {
            let mut status = self.status.lock();
            if *status == SyncStatusKind::Error {
                *status = SyncStatusKind::Idle;
            }
        }
        self.publish().await;
        Ok(())
    }

    /// Drop resolved conflicts from the audit list.
    pub async fn clear_resolved_conflicts(&self) -> Result<usize> {
        let removed = self.store.clear_resolved_conflicts().await?;
        self.publish().await;
        Ok(removed)
    }

    fn set_status(&self, status: SyncStatusKind) {
        *self.status.lock() = status;
    }

    async fn record_error(&self, message: String) {
        let record = SyncErrorRecord {
            timestamp: self.store.now(),
            message,
        };
        if let Err(error) = self
            .store
            .push_sync_error(record, self.config.max_errors)
            .await
        {
            tracing::warn!("Failed to record sync error: {}", error);
        }
    }

    async fn publish(&self) {
        if self.listeners.is_empty() {
            return;
        }
        match self.state().await {
            Ok(state) => self.listeners.notify(&state),
            Err(error) => tracing::warn!("Failed to compute sync state: {}", error),
        }
    }
}
