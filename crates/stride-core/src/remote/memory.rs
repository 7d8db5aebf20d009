//! In-memory [`RemoteApi`] with version checks and fault injection.
//!
//! Backs tests and offline demos. Writes carrying a base version are rejected
//! with [`RemoteError::VersionConflict`] when the stored version moved on.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::{Mutation, QueryFilter, RemoteAck, RemoteApi, RemoteError, RemoteRecord, RemoteResult};
use crate::models::{SyncOperation, Table};

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<(Table, String), RemoteRecord>,
    next_version: i64,
    next_server_id: u64,
    assign_server_ids: bool,
    scripted: HashMap<String, VecDeque<RemoteError>>,
    blobs: HashMap<String, Vec<u8>>,
    mutations: Vec<Mutation>,
    queries: usize,
}

impl MemoryState {
    fn bump_version(&mut self) -> i64 {
        self.next_version += 1;
        self.next_version
    }
}

/// Fake authoritative backend
#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
    reachable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            reachable: AtomicBool::new(true),
            latency: Mutex::new(None),
        }
    }

    /// Assign `srv-N` ids on create instead of keeping the client id.
    #[must_use]
    pub fn with_server_ids(self) -> Self {
        self.state.lock().assign_server_ids = true;
        self
    }

    /// Insert or overwrite a record as if another device wrote it.
    pub fn put(&self, table: Table, id: &str, data: Value) -> i64 {
        let mut state = self.state.lock();
        let version = state.bump_version();
        state.records.insert(
            (table, id.to_string()),
            RemoteRecord {
                id: id.to_string(),
                version,
                data: with_id(data, id),
            },
        );
        version
    }

    /// Delete a record as if another device removed it.
    pub fn remove(&self, table: Table, id: &str) -> bool {
        self.state
            .lock()
            .records
            .remove(&(table, id.to_string()))
            .is_some()
    }

    pub fn record(&self, table: Table, id: &str) -> Option<RemoteRecord> {
        self.state
            .lock()
            .records
            .get(&(table, id.to_string()))
            .cloned()
    }

    pub fn records(&self, table: Table) -> Vec<RemoteRecord> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|((record_table, _), _)| *record_table == table)
            .map(|(_, record)| record.clone())
            .collect()
    }

    /// Fail the next write touching `entity_id` with `error`.
    pub fn fail_next(&self, entity_id: &str, error: RemoteError) {
        self.state
            .lock()
            .scripted
            .entry(entity_id.to_string())
            .or_default()
            .push_back(error);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delay every call, to keep cycles in flight during tests.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn put_blob(&self, url: &str, bytes: Vec<u8>) {
        self.state.lock().blobs.insert(url.to_string(), bytes);
    }

    /// Every write received so far, in arrival order
    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().mutations.clone()
    }

    pub fn query_count(&self) -> usize {
        self.state.lock().queries
    }

    async fn simulate_network(&self) -> RemoteResult<()> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Transient("remote unreachable".to_string()))
        }
    }

    fn apply(&self, mutation: &Mutation) -> RemoteResult<RemoteAck> {
        let mut state = self.state.lock();
        state.mutations.push(mutation.clone());

        if let Some(error) = state
            .scripted
            .get_mut(&mutation.entity_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        let table = mutation.table;
        let key = (table, mutation.entity_id.clone());
        let current = state.records.get(&key).cloned();

        if let (Some(base), Some(current)) = (mutation.base_version, &current) {
            if base != current.version && mutation.operation != SyncOperation::Create {
                return Err(RemoteError::VersionConflict {
                    table,
                    id: mutation.entity_id.clone(),
                    current: Some(current.clone()),
                });
            }
        }

        match mutation.operation {
            SyncOperation::Create => {
                let id = if state.assign_server_ids && current.is_none() {
                    state.next_server_id += 1;
                    format!("srv-{}", state.next_server_id)
                } else {
                    mutation.entity_id.clone()
                };
                let version = state.bump_version();
                state.records.insert(
                    (table, id.clone()),
                    RemoteRecord {
                        id: id.clone(),
                        version,
                        data: with_id(mutation.payload.clone(), &id),
                    },
                );
                Ok(RemoteAck { id, version })
            }
            SyncOperation::Update => {
                if current.is_none() {
                    return Err(RemoteError::NotFound {
                        table,
                        id: mutation.entity_id.clone(),
                    });
                }
                let version = state.bump_version();
                state.records.insert(
                    key,
                    RemoteRecord {
                        id: mutation.entity_id.clone(),
                        version,
                        data: with_id(mutation.payload.clone(), &mutation.entity_id),
                    },
                );
                Ok(RemoteAck {
                    id: mutation.entity_id.clone(),
                    version,
                })
            }
            SyncOperation::Delete => {
                let Some(removed) = state.records.remove(&key) else {
                    return Err(RemoteError::NotFound {
                        table,
                        id: mutation.entity_id.clone(),
                    });
                };
                Ok(RemoteAck {
                    id: removed.id,
                    version: removed.version,
                })
            }
        }
    }
}

fn with_id(mut data: Value, id: &str) -> Value {
    if let Value::Object(map) = &mut data {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }
    data
}

impl RemoteApi for MemoryRemote {
    async fn query(&self, table: Table, filter: &QueryFilter) -> RemoteResult<Vec<RemoteRecord>> {
        self.simulate_network().await?;
        self.state.lock().queries += 1;
        Ok(match filter {
            QueryFilter::All => self.records(table),
            QueryFilter::ById(id) => self.record(table, id).into_iter().collect(),
        })
    }

    async fn mutate(&self, mutation: &Mutation) -> RemoteResult<RemoteAck> {
        self.simulate_network().await?;
        self.apply(mutation)
    }

    async fn fetch_blob(&self, url: &str) -> RemoteResult<Vec<u8>> {
        self.simulate_network().await?;
        self.state
            .lock()
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::Validation(format!("no image at {url}")))
    }
}
