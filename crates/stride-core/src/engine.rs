//! Consumer-facing API over the local replica and the synchronizer.
//!
//! Reads always come from the local replica. Writes go straight to the remote
//! when online and the record has no queued work, and fall back to the sync
//! queue otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::models::{
    new_local_id, Collection, Entity, EntityIndex, Run, Shoe, SyncConflict, SyncOperation,
    SyncState, SyncStatus, Table,
};
use crate::remote::{Mutation, RemoteApi, RemoteError, RemoteRecord};
use crate::store::LocalStore;
use crate::sync::{
    spawn_scheduler, CycleOutcome, ListenerHandle, NetworkMonitor, SyncConfig, SyncOrchestrator,
    TickSource,
};
use crate::Result;

/// Local-first access to collections, shoes and runs
pub struct SyncEngine<R> {
    store: LocalStore,
    remote: Arc<R>,
    orchestrator: Arc<SyncOrchestrator<R>>,
    network: Arc<NetworkMonitor>,
}

impl<R> std::fmt::Debug for SyncEngine<R> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncEngine")
            .field("store", &self.store)
            .field("online", &self.network.is_online())
            .finish_non_exhaustive()
    }
}

impl<R: RemoteApi> SyncEngine<R> {
    /// Wire an engine around an open store. Retry and cache limits from
    /// `config` are applied to the store.
    pub fn new(store: LocalStore, remote: Arc<R>, config: SyncConfig) -> Self {
        let store = store
            .with_max_retries(config.max_retries)
            .with_cache_quota(config.cache_quota);
        let orchestrator = Arc::new(SyncOrchestrator::new(store.clone(), remote.clone(), config));
        Self {
            store,
            remote,
            orchestrator,
            network: Arc::new(NetworkMonitor::default()),
        }
    }

    /// Open the replica at `db_path` and wire an engine around it.
    pub async fn open_path(
        db_path: impl Into<PathBuf>,
        remote: Arc<R>,
        config: SyncConfig,
    ) -> Result<Self> {
        let store = LocalStore::open_path(db_path).await?;
        Ok(Self::new(store, remote, config))
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator<R>> {
        &self.orchestrator
    }

    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    /// Report a network change; coming online wakes a running scheduler.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.network.set_online(online);
        if changed {
            tracing::info!("Network is now {}", if online { "online" } else { "offline" });
        }
        changed
    }

    // Collections

    pub async fn get_collections(&self) -> Result<Vec<Collection>> {
        self.store.get_all().await
    }

    pub async fn get_collection(&self, id: &str) -> Result<Option<Collection>> {
        self.store.get(id).await
    }

    pub async fn save_collection(
        &self,
        collection: &Collection,
        offline: bool,
    ) -> Result<Collection> {
        self.save(collection, offline).await
    }

    pub async fn delete_collection(&self, id: &str, offline: bool) -> Result<bool> {
        self.delete::<Collection>(id, offline).await
    }

    // Shoes

    pub async fn get_shoes(&self) -> Result<Vec<Shoe>> {
        self.store.get_all().await
    }

    pub async fn get_shoe(&self, id: &str) -> Result<Option<Shoe>> {
        self.store.get(id).await
    }

    pub async fn get_shoes_in_collection(&self, collection_id: &str) -> Result<Vec<Shoe>> {
        self.store
            .get_by_index(EntityIndex::Parent, collection_id)
            .await
    }

    pub async fn save_shoe(&self, shoe: &Shoe, offline: bool) -> Result<Shoe> {
        self.save(shoe, offline).await
    }

    pub async fn delete_shoe(&self, id: &str, offline: bool) -> Result<bool> {
        self.delete::<Shoe>(id, offline).await
    }

    // Runs

    pub async fn get_runs(&self) -> Result<Vec<Run>> {
        self.store.get_all().await
    }

    pub async fn get_run(&self, id: &str) -> Result<Option<Run>> {
        self.store.get(id).await
    }

    pub async fn get_runs_for_shoe(&self, shoe_id: &str) -> Result<Vec<Run>> {
        self.store.get_by_index(EntityIndex::Parent, shoe_id).await
    }

    pub async fn save_run(&self, run: &Run, offline: bool) -> Result<Run> {
        self.save(run, offline).await
    }

    pub async fn delete_run(&self, id: &str, offline: bool) -> Result<bool> {
        self.delete::<Run>(id, offline).await
    }

    /// Save `entity`, assigning a local id when it has none.
    ///
    /// Returns the stored value, whose id may have been replaced by the
    /// remote's canonical one.
    pub async fn save<E: Entity>(&self, entity: &E, offline: bool) -> Result<E> {
        let mut entity = entity.clone();
        if entity.id().trim().is_empty() {
            entity.set_id(new_local_id());
        }
        entity.validate()?;

        if !self.should_write_through(E::TABLE, entity.id(), offline).await? {
            self.store.save(&entity, true).await?;
            return Ok(entity);
        }

        let exists = self.store.document(E::TABLE, entity.id()).await?.is_some();
        let mutation = Mutation {
            operation: if exists {
                SyncOperation::Update
            } else {
                SyncOperation::Create
            },
            table: E::TABLE,
            entity_id: entity.id().to_string(),
            payload: serde_json::to_value(&entity)?,
            base_version: self.store.remote_version(E::TABLE, entity.id()).await?,
        };

        match self.remote.mutate(&mutation).await {
            Ok(ack) => {
                let record = RemoteRecord {
                    id: ack.id,
                    version: ack.version,
                    data: mutation.payload,
                };
                self.store
                    .accept_remote(E::TABLE, entity.id(), Some(&record))
                    .await?;
                entity.set_id(record.id);
                Ok(entity)
            }
            Err(RemoteError::Validation(message)) => Err(RemoteError::Validation(message).into()),
            Err(error) => {
                tracing::debug!(
                    "Write-through of {}/{} failed ({}); queueing it",
                    E::TABLE,
                    entity.id(),
                    error
                );
                self.store.save(&entity, true).await?;
                Ok(entity)
            }
        }
    }

    /// Delete the record with `id`. Returns whether it existed locally.
    pub async fn delete<E: Entity>(&self, id: &str, offline: bool) -> Result<bool> {
        if !self.should_write_through(E::TABLE, id, offline).await? {
            return self.store.delete::<E>(id, true).await;
        }
        let Some(payload) = self.store.document(E::TABLE, id).await? else {
            return Ok(false);
        };

        let mutation = Mutation {
            operation: SyncOperation::Delete,
            table: E::TABLE,
            entity_id: id.to_string(),
            payload,
            base_version: self.store.remote_version(E::TABLE, id).await?,
        };
        match self.remote.mutate(&mutation).await {
            Ok(_) | Err(RemoteError::NotFound { .. }) => self.store.delete::<E>(id, false).await,
            Err(RemoteError::Validation(message)) => Err(RemoteError::Validation(message).into()),
            Err(error) => {
                tracing::debug!(
                    "Remote delete of {}/{} failed ({}); queueing it",
                    E::TABLE,
                    id,
                    error
                );
                self.store.delete::<E>(id, true).await
            }
        }
    }

    /// Online writes for records without queued or conflicting local state
    /// skip the queue.
    async fn should_write_through(
        &self,
        table: Table,
        id: &str,
        offline: bool,
    ) -> Result<bool> {
        if offline || !self.is_online() {
            return Ok(false);
        }
        Ok(matches!(
            self.store.sync_status(table, id).await?,
            None | Some(SyncStatus::Synced)
        ))
    }

    // Sync

    pub async fn get_sync_state(&self) -> Result<SyncState> {
        self.orchestrator.state().await
    }

    pub fn add_sync_listener(
        &self,
        listener: impl Fn(&SyncState) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.orchestrator.add_listener(listener)
    }

    /// Run a cycle now, unless one is already running.
    pub async fn force_sync_now(&self) -> CycleOutcome {
        self.orchestrator.sync_now().await
    }

    pub async fn resolve_conflict_manually(
        &self,
        conflict_id: &str,
        use_local: bool,
    ) -> Result<SyncConflict> {
        self.orchestrator
            .resolve_conflict_manually(conflict_id, use_local)
            .await
    }

    pub async fn clear_sync_errors(&self) -> Result<()> {
        self.orchestrator.clear_sync_errors().await
    }

    pub async fn clear_resolved_conflicts(&self) -> Result<usize> {
        self.orchestrator.clear_resolved_conflicts().await
    }

    /// Image bytes for `url`, served from the blob cache when present.
    ///
    /// Misses are fetched and cached while online; offline misses return
    /// `None`.
    pub async fn cached_image(&self, url: &str) -> Result<Option<Vec<u8>>> {
        if let Some(blob) = self.store.get_cached_blob(url).await? {
            return Ok(Some(blob));
        }
        if !self.is_online() {
            return Ok(None);
        }

        let blob = self.remote.fetch_blob(url).await?;
        self.store.cache_blob(url, blob.clone()).await?;
        Ok(Some(blob))
    }
}

impl<R: RemoteApi + 'static> SyncEngine<R> {
    /// Start scheduled cycles at the configured interval.
    pub fn spawn_scheduler(&self) -> JoinHandle<()> {
        let interval = self.orchestrator.config().sync_interval;
        self.spawn_scheduler_with(TickSource::Interval(interval))
    }

    /// Start scheduled cycles driven by `ticks`.
    pub fn spawn_scheduler_with(&self, ticks: TickSource) -> JoinHandle<()> {
        spawn_scheduler(self.orchestrator.clone(), self.network.subscribe(), ticks)
    }
}
